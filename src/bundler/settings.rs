//! Configuration structures for bundling operations.
//!
//! Everything the pipeline needs to know about the product (names, versions,
//! paths, disk image behaviour) lives in [`Settings`], which is built once via
//! [`SettingsBuilder`] and passed into every stage.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Package metadata and configuration.
///
/// # Examples
///
/// ```no_run
/// use cpu_limiter_bundler::bundler::PackageSettings;
///
/// let settings = PackageSettings {
///     product_name: "CPU Limiter".into(),
///     version: "0.1.0".into(),
///     build_number: "1".into(),
///     executable_name: "cpu-limiter".into(),
///     description: "Keeps runaway processes in check".into(),
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct PackageSettings {
    /// Product name displayed to users.
    ///
    /// Used for the `.app` directory name, the DMG volume label and the final
    /// image file name.
    pub product_name: String,

    /// Version string in semantic versioning format.
    ///
    /// Written to `CFBundleShortVersionString` and the DMG file name.
    pub version: String,

    /// Build number written to `CFBundleVersion`.
    pub build_number: String,

    /// File name of the executable inside `Contents/MacOS`.
    pub executable_name: String,

    /// Brief description of the application.
    pub description: String,
}

/// macOS bundle metadata written to `Info.plist`.
#[derive(Clone, Debug)]
pub struct BundleSettings {
    /// Reverse-DNS bundle identifier (e.g., "com.example.cpulimiter").
    pub identifier: String,

    /// Application category, e.g. "public.app-category.utilities".
    pub category: String,

    /// Human-readable copyright notice.
    pub copyright: Option<String>,

    /// Minimum macOS version (`LSMinimumSystemVersion`).
    pub minimum_system_version: String,

    /// Whether the app declares Retina support (`NSHighResolutionCapable`).
    pub high_resolution_capable: bool,
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            category: "public.app-category.utilities".into(),
            copyright: None,
            minimum_system_version: "11.0".into(),
            high_resolution_capable: true,
        }
    }
}

/// Finder icon arrangement for the mounted volume window.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Arrangement {
    /// Icons stay where they are placed.
    #[default]
    NotArranged,
    /// Finder sorts icons by name.
    ByName,
    /// Finder snaps icons to the grid.
    SnapToGrid,
}

impl Arrangement {
    /// AppleScript keyword for this arrangement.
    pub fn as_applescript(&self) -> &'static str {
        match self {
            Arrangement::NotArranged => "not arranged",
            Arrangement::ByName => "arranged by name",
            Arrangement::SnapToGrid => "snap to grid",
        }
    }
}

/// Cosmetic Finder window layout applied to the mounted disk image.
///
/// Absence of a layout (or failure to apply it) never invalidates the image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WindowLayout {
    /// Top-left corner of the window on screen.
    pub window_origin: (u32, u32),
    /// Window width and height in points.
    pub window_size: (u32, u32),
    /// Icon size in points.
    pub icon_size: u32,
    /// Position of the `.app` icon inside the window.
    pub app_position: (u32, u32),
    /// Position of the `Applications` shortcut inside the window.
    pub applications_position: (u32, u32),
    /// Icon arrangement mode.
    pub arrangement: Arrangement,
}

impl WindowLayout {
    /// Window bounds as `(left, top, right, bottom)`, clamped at `u32::MAX`.
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        let (x, y) = self.window_origin;
        let (w, h) = self.window_size;
        (x, y, x.saturating_add(w), y.saturating_add(h))
    }
}

impl Default for WindowLayout {
    fn default() -> Self {
        Self {
            window_origin: (400, 100),
            window_size: (500, 300),
            icon_size: 100,
            app_position: (125, 150),
            applications_position: (375, 150),
            arrangement: Arrangement::NotArranged,
        }
    }
}

/// macOS DMG disk image configuration.
#[derive(Clone, Debug)]
pub struct DmgSettings {
    /// Finder window layout. `None` skips customization entirely.
    pub layout: Option<WindowLayout>,

    /// Directory under which per-run mount points are created.
    ///
    /// Default: `/Volumes`
    pub mount_root: PathBuf,

    /// Upper bound on waiting for a freshly attached volume to appear.
    pub mount_timeout: Duration,

    /// Delay between mount point existence checks.
    pub poll_interval: Duration,

    /// Time given to Finder to flush `.DS_Store` before detaching.
    pub settle_delay: Duration,

    /// Remove staging directory and writable image when a fatal error occurs.
    ///
    /// Default: false (partial artifacts are left for inspection)
    pub cleanup_on_failure: bool,
}

impl Default for DmgSettings {
    fn default() -> Self {
        Self {
            layout: Some(WindowLayout::default()),
            mount_root: PathBuf::from("/Volumes"),
            mount_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            settle_delay: Duration::from_secs(2),
            cleanup_on_failure: false,
        }
    }
}

/// Complete bundler configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    package: PackageSettings,
    bundle_settings: BundleSettings,
    dmg: DmgSettings,

    /// Compiled executable to package.
    binary_path: PathBuf,

    /// Optional PNG icon copied into `Contents/Resources`.
    icon_path: Option<PathBuf>,

    /// Output directory for the `.app` and `.dmg`.
    project_out_directory: PathBuf,

    /// Cargo project to build before bundling. `None` means the binary is prebuilt.
    project_directory: Option<PathBuf>,
}

impl Settings {
    /// Returns the product name.
    pub fn product_name(&self) -> &str {
        &self.package.product_name
    }

    /// Returns the version string.
    pub fn version_string(&self) -> &str {
        &self.package.version
    }

    /// Returns the build number.
    pub fn build_number(&self) -> &str {
        &self.package.build_number
    }

    /// Returns the executable file name used inside the bundle.
    pub fn executable_name(&self) -> &str {
        &self.package.executable_name
    }

    /// Returns the package description.
    pub fn description(&self) -> &str {
        &self.package.description
    }

    /// Returns the bundle metadata.
    pub fn bundle_settings(&self) -> &BundleSettings {
        &self.bundle_settings
    }

    /// Returns the disk image configuration.
    pub fn dmg(&self) -> &DmgSettings {
        &self.dmg
    }

    /// Returns the compiled binary path.
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Returns the icon path, if one is configured.
    pub fn icon_path(&self) -> Option<&Path> {
        self.icon_path.as_deref()
    }

    /// Returns the project output directory.
    pub fn project_out_directory(&self) -> &Path {
        &self.project_out_directory
    }

    /// Returns the Cargo project to compile, if the binary is not prebuilt.
    pub fn project_directory(&self) -> Option<&Path> {
        self.project_directory.as_deref()
    }

    /// Name of the `.app` directory, e.g. `CPU Limiter.app`.
    pub fn app_bundle_name(&self) -> String {
        format!("{}.app", self.product_name())
    }

    /// Path the `.app` bundle is assembled at.
    pub fn app_bundle_path(&self) -> PathBuf {
        self.project_out_directory.join(self.app_bundle_name())
    }

    /// Final compressed image path: `<out>/<Product>-<Version>.dmg`.
    pub fn dmg_path(&self) -> PathBuf {
        self.project_out_directory.join(format!(
            "{}-{}.dmg",
            self.product_name(),
            self.version_string()
        ))
    }
}

/// Builder for [`Settings`].
///
/// # Examples
///
/// ```no_run
/// use cpu_limiter_bundler::bundler::{PackageSettings, SettingsBuilder};
///
/// # fn example() -> cpu_limiter_bundler::bundler::Result<()> {
/// let settings = SettingsBuilder::new()
///     .project_out_directory("target/release/bundle")
///     .binary_path("target/release/cpu-limiter")
///     .package_settings(PackageSettings {
///         product_name: "CPU Limiter".into(),
///         version: "0.1.0".into(),
///         build_number: "1".into(),
///         executable_name: "cpu-limiter".into(),
///         ..Default::default()
///     })
///     .build()?;
/// assert!(settings.dmg_path().ends_with("CPU Limiter-0.1.0.dmg"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    package_settings: Option<PackageSettings>,
    bundle_settings: BundleSettings,
    dmg_settings: DmgSettings,
    binary_path: Option<PathBuf>,
    icon_path: Option<PathBuf>,
    project_out_directory: Option<PathBuf>,
    project_directory: Option<PathBuf>,
}

impl SettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the directory the `.app` and `.dmg` are written to.
    ///
    /// # Required
    pub fn project_out_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_out_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets package metadata.
    ///
    /// # Required
    pub fn package_settings(mut self, settings: PackageSettings) -> Self {
        self.package_settings = Some(settings);
        self
    }

    /// Sets bundle metadata.
    pub fn bundle_settings(mut self, settings: BundleSettings) -> Self {
        self.bundle_settings = settings;
        self
    }

    /// Sets disk image configuration.
    pub fn dmg_settings(mut self, settings: DmgSettings) -> Self {
        self.dmg_settings = settings;
        self
    }

    /// Sets the compiled binary to package.
    ///
    /// # Required
    pub fn binary_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.binary_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the optional icon.
    pub fn icon_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.icon_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the Cargo project compiled before bundling.
    pub fn project_directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing, or if the product or
    /// executable name is empty or contains a path separator.
    pub fn build(self) -> crate::bundler::Result<Settings> {
        use crate::bundler::error::Context;

        let package = self
            .package_settings
            .context("package_settings is required")?;

        for (field, value) in [
            ("product_name", &package.product_name),
            ("executable_name", &package.executable_name),
            ("version", &package.version),
        ] {
            if value.trim().is_empty() {
                crate::bail!("{} must not be empty", field);
            }
            if value.contains('/') {
                crate::bail!("{} must not contain '/': {}", field, value);
            }
        }

        Ok(Settings {
            package,
            bundle_settings: self.bundle_settings,
            dmg: self.dmg_settings,
            binary_path: self.binary_path.context("binary_path is required")?,
            icon_path: self.icon_path,
            project_out_directory: self
                .project_out_directory
                .context("project_out_directory is required")?,
            project_directory: self.project_directory,
        })
    }
}
