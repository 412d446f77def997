//! Direct install from a finished disk image.
//!
//! Attaches the image read-only and hidden at a private mount point, copies the
//! single `.app` at its root into the applications directory (replacing any
//! previous copy), clears the quarantine attribute and detaches.

use crate::bundler::{
    AttachMode, ImageTool, Result,
    error::{Error, ErrorExt},
    utils::{fs, process::run_tool},
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// System applications directory.
pub const APPLICATIONS_DIR: &str = "/Applications";

const QUARANTINE_ATTRIBUTE: &str = "com.apple.quarantine";

/// Installs the `.app` contained in `dmg` into `applications_dir`.
///
/// Returns the installed bundle path. The image is detached on every path out
/// once it was attached.
pub async fn install_from_dmg<T: ImageTool>(
    tool: &T,
    dmg: &Path,
    applications_dir: &Path,
) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(dmg)
        .await
        .fs_context("reading disk image", dmg)?;
    if !metadata.is_file() {
        crate::bail!("{} is not a disk image file", dmg.display());
    }

    let mount_dir = tempfile::Builder::new()
        .prefix("cpu-limiter-install-")
        .tempdir()
        .fs_context("creating private mount point", std::env::temp_dir())?;
    let mount_point = mount_dir.path();

    log::info!("Attaching {} at {}", dmg.display(), mount_point.display());
    tool.attach(dmg, mount_point, AttachMode::ReadOnlyHidden)
        .await?;

    let installed = copy_out(mount_point, applications_dir).await;

    let detached = tool.detach(mount_point).await;
    if let Err(e) = &detached {
        log::warn!("Failed to detach {}: {}", mount_point.display(), e);
    }

    let installed = installed?;
    detached?;
    Ok(installed)
}

async fn copy_out(mount_point: &Path, applications_dir: &Path) -> Result<PathBuf> {
    let app = find_single_app(mount_point).await?;
    let name = app
        .file_name()
        .ok_or_else(|| Error::GenericError(format!("invalid bundle path {}", app.display())))?;
    let destination = applications_dir.join(name);

    if tokio::fs::symlink_metadata(&destination).await.is_ok() {
        log::info!("Replacing existing {}", destination.display());
        fs::remove_dir_all(&destination).await?;
    }

    log::info!("Copying {} to {}", app.display(), applications_dir.display());
    fs::copy_dir(&app, &destination).await?;

    clear_quarantine(&destination).await;
    Ok(destination)
}

/// Finds the one `.app` directory at the root of the mounted volume.
pub async fn find_single_app(mount_point: &Path) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(mount_point)
        .await
        .fs_context("reading mounted volume", mount_point)?;

    let mut apps = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .fs_context("reading mounted volume", mount_point)?
    {
        let path = entry.path();
        let is_app = path.extension().is_some_and(|ext| ext == "app");
        if is_app && entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            apps.push(path);
        }
    }

    match apps.len() {
        1 => Ok(apps.remove(0)),
        0 => Err(Error::GenericError(format!(
            "no .app bundle found in {}",
            mount_point.display()
        ))),
        n => Err(Error::GenericError(format!(
            "expected one .app bundle in {}, found {}",
            mount_point.display(),
            n
        ))),
    }
}

async fn clear_quarantine(bundle: &Path) {
    if which::which("xattr").is_err() {
        log::warn!(
            "xattr not found; {} keeps its {} attribute",
            bundle.display(),
            QUARANTINE_ATTRIBUTE
        );
        return;
    }

    let args: [&OsStr; 3] = ["-dr".as_ref(), QUARANTINE_ATTRIBUTE.as_ref(), bundle.as_os_str()];
    if let Err(e) = run_tool("xattr", args, "xattr").await {
        log::warn!("Could not clear quarantine attribute: {}", e);
    }
}
