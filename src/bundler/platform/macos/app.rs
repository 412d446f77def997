//! macOS application bundle (.app) creation.
//!
//! The layout is fixed:
//!
//! ```text
//! <Name>.app/
//!   Contents/
//!     Info.plist
//!     MacOS/<ExecutableName>
//!     Resources/AppIcon.png   (optional)
//! ```

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    settings::Settings,
    utils::fs,
};
use std::path::{Path, PathBuf};
use tokio::fs as tokio_fs;

/// File name of the icon inside `Contents/Resources`.
pub const ICON_FILE_NAME: &str = "AppIcon.png";

/// Paths inside an assembled `.app` bundle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppBundle {
    root: PathBuf,
}

impl AppBundle {
    /// Wraps an existing or to-be-created bundle directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The `<Name>.app` directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Contents/`
    pub fn contents_dir(&self) -> PathBuf {
        self.root.join("Contents")
    }

    /// `Contents/MacOS/`
    pub fn macos_dir(&self) -> PathBuf {
        self.contents_dir().join("MacOS")
    }

    /// `Contents/Resources/`
    pub fn resources_dir(&self) -> PathBuf {
        self.contents_dir().join("Resources")
    }

    /// `Contents/MacOS/<executable_name>`
    pub fn executable_path(&self, executable_name: &str) -> PathBuf {
        self.macos_dir().join(executable_name)
    }

    /// `Contents/Resources/AppIcon.png`
    pub fn icon_path(&self) -> PathBuf {
        self.resources_dir().join(ICON_FILE_NAME)
    }

    /// `Contents/Info.plist`
    pub fn info_plist_path(&self) -> PathBuf {
        self.contents_dir().join("Info.plist")
    }
}

/// Bundles the configured binary and icon as a macOS .app bundle.
pub async fn bundle_project(settings: &Settings) -> Result<PathBuf> {
    assemble(settings.binary_path(), settings.icon_path(), settings).await
}

/// Assembles `<out>/<Product>.app` from `binary_path` and an optional icon.
///
/// The binary must exist before anything is written; a missing binary is
/// [`Error::MissingBinary`] and leaves the output directory untouched. A
/// missing icon is logged and skipped.
pub async fn assemble(
    binary_path: &Path,
    icon_path: Option<&Path>,
    settings: &Settings,
) -> Result<PathBuf> {
    match tokio_fs::metadata(binary_path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(Error::MissingBinary {
                path: binary_path.to_path_buf(),
            });
        }
    }

    let bundle = AppBundle::at(settings.app_bundle_path());
    log::info!("Assembling {}", bundle.root().display());

    fs::create_dir_all(bundle.root(), true).await?;
    fs::create_dir_all(&bundle.macos_dir(), false).await?;
    fs::create_dir_all(&bundle.resources_dir(), false).await?;

    copy_binary(binary_path, &bundle, settings.executable_name()).await?;
    let icon_copied = copy_icon(icon_path, &bundle).await?;

    create_info_plist(&bundle, icon_copied, settings)?;

    Ok(bundle.root().to_path_buf())
}

/// Copies the binary into `Contents/MacOS` and marks it executable.
async fn copy_binary(binary_path: &Path, bundle: &AppBundle, executable_name: &str) -> Result<()> {
    let dst = bundle.executable_path(executable_name);

    tokio_fs::copy(binary_path, &dst)
        .await
        .fs_context("copying binary", &dst)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio_fs::set_permissions(&dst, std::fs::Permissions::from_mode(0o755))
            .await
            .fs_context("failed to set executable permissions", &dst)?;
    }

    log::debug!("Copied binary to {}", dst.display());
    Ok(())
}

/// Copies the icon if it exists. Returns whether an icon was copied.
async fn copy_icon(icon_path: Option<&Path>, bundle: &AppBundle) -> Result<bool> {
    let Some(icon) = icon_path else {
        return Ok(false);
    };

    if !icon.is_file() {
        log::warn!("Icon {} not found, bundling without icon", icon.display());
        return Ok(false);
    }

    let dst = bundle.icon_path();
    tokio_fs::copy(icon, &dst)
        .await
        .fs_context("copying app icon", &dst)?;
    Ok(true)
}

/// Creates the Info.plist file for the macOS bundle
fn create_info_plist(bundle: &AppBundle, has_icon: bool, settings: &Settings) -> Result<()> {
    use plist::Value;

    let meta = settings.bundle_settings();
    let mut dict = plist::Dictionary::new();

    dict.insert("CFBundleDevelopmentRegion".into(), "en".into());
    dict.insert("CFBundleDisplayName".into(), settings.product_name().into());
    dict.insert(
        "CFBundleExecutable".into(),
        settings.executable_name().into(),
    );
    dict.insert("CFBundleIdentifier".into(), meta.identifier.clone().into());
    dict.insert("CFBundleName".into(), settings.product_name().into());
    dict.insert("CFBundlePackageType".into(), "APPL".into());
    dict.insert(
        "CFBundleShortVersionString".into(),
        settings.version_string().into(),
    );
    dict.insert("CFBundleVersion".into(), settings.build_number().into());
    dict.insert("CFBundleInfoDictionaryVersion".into(), "6.0".into());

    if has_icon {
        dict.insert("CFBundleIconFile".into(), ICON_FILE_NAME.into());
    }

    dict.insert(
        "LSApplicationCategoryType".into(),
        meta.category.clone().into(),
    );
    dict.insert(
        "LSMinimumSystemVersion".into(),
        meta.minimum_system_version.clone().into(),
    );
    dict.insert(
        "NSHighResolutionCapable".into(),
        meta.high_resolution_capable.into(),
    );

    if let Some(copyright) = meta.copyright.as_ref() {
        dict.insert("NSHumanReadableCopyright".into(), copyright.clone().into());
    }

    let plist_path = bundle.info_plist_path();
    Value::Dictionary(dict)
        .to_file_xml(&plist_path)
        .map_err(Error::Plist)
        .with_context(|| format!("writing {}", plist_path.display()))?;

    Ok(())
}
