//! Packaging configuration.
//!
//! Naming, versioning and paths default to compile-time constants. A TOML file
//! can override any of them:
//!
//! ```toml
//! product_name = "CPU Limiter"
//! version = "0.2.0"
//! prebuilt = true
//! binary_path = "target/release/cpu-limiter"
//!
//! [dmg]
//! mount_timeout_ms = 20000
//!
//! [dmg.window]
//! width = 600
//! arrangement = "snap-to-grid"
//! ```
//!
//! The file is taken from `CPU_LIMITER_BUNDLE_CONFIG` when set, else from
//! `Bundle.toml` in the working directory when present.

use crate::bundler::{
    Arrangement, BundleSettings, DmgSettings, PackageSettings, Settings, SettingsBuilder,
    WindowLayout,
};
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "CPU_LIMITER_BUNDLE_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "Bundle.toml";

const DEFAULT_PRODUCT_NAME: &str = "CPU Limiter";
const DEFAULT_VERSION: &str = "0.1.0";
const DEFAULT_BUILD_NUMBER: &str = "1";
const DEFAULT_IDENTIFIER: &str = "com.cpulimiter.app";
const DEFAULT_EXECUTABLE: &str = "cpu-limiter";

/// Everything the packaging binary can be told, in file form.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackagingConfig {
    /// Product name, used for the bundle, volume and image names.
    pub product_name: String,
    /// Marketing version.
    pub version: String,
    /// Build number (`CFBundleVersion`).
    pub build_number: String,
    /// Reverse-DNS bundle identifier.
    pub identifier: String,
    /// Application category tag.
    pub category: String,
    /// Copyright notice.
    pub copyright: Option<String>,
    /// Minimum macOS version.
    pub minimum_system_version: String,
    /// Declares Retina support.
    pub high_resolution_capable: bool,
    /// Executable file name inside the bundle, and the cargo `--bin` target.
    pub executable_name: String,
    /// Short description.
    pub description: String,
    /// Cargo project holding the application.
    pub project_directory: PathBuf,
    /// Compiled binary. Default: `<project>/target/release/<executable_name>`.
    pub binary_path: Option<PathBuf>,
    /// Icon. Default: `<project>/src/icon.png` (skipped if absent).
    pub icon_path: Option<PathBuf>,
    /// Output directory. Default: `<project>/target/release/bundle/macos`.
    pub output_directory: Option<PathBuf>,
    /// Skip `cargo build` and package the binary as found.
    pub prebuilt: bool,
    /// Remove partial disk image artifacts when a run fails.
    pub cleanup_on_failure: bool,
    /// Disk image behaviour.
    pub dmg: DmgConfig,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            build_number: DEFAULT_BUILD_NUMBER.to_string(),
            identifier: DEFAULT_IDENTIFIER.to_string(),
            category: "public.app-category.utilities".to_string(),
            copyright: Some(format!("Copyright © {DEFAULT_PRODUCT_NAME} contributors")),
            minimum_system_version: "11.0".to_string(),
            high_resolution_capable: true,
            executable_name: DEFAULT_EXECUTABLE.to_string(),
            description: "Limits the CPU usage of selected processes".to_string(),
            project_directory: PathBuf::from("."),
            binary_path: None,
            icon_path: None,
            output_directory: None,
            prebuilt: false,
            cleanup_on_failure: false,
            dmg: DmgConfig::default(),
        }
    }
}

/// `[dmg]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DmgConfig {
    /// Directory under which per-run mount points are created.
    pub mount_root: PathBuf,
    /// Mount wait upper bound, in milliseconds.
    pub mount_timeout_ms: u64,
    /// Mount poll interval, in milliseconds.
    pub poll_interval_ms: u64,
    /// Wait after a successful Finder script, in milliseconds.
    pub settle_delay_ms: u64,
    /// Apply the Finder window layout at all.
    pub customize: bool,
    /// Window layout.
    pub window: WindowConfig,
}

impl Default for DmgConfig {
    fn default() -> Self {
        let defaults = DmgSettings::default();
        Self {
            mount_root: defaults.mount_root,
            mount_timeout_ms: defaults.mount_timeout.as_millis() as u64,
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            settle_delay_ms: defaults.settle_delay.as_millis() as u64,
            customize: true,
            window: WindowConfig::default(),
        }
    }
}

/// `[dmg.window]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Window left edge.
    pub x: u32,
    /// Window top edge.
    pub y: u32,
    /// Window width.
    pub width: u32,
    /// Window height.
    pub height: u32,
    /// Icon size.
    pub icon_size: u32,
    /// `.app` icon position.
    pub app_position: (u32, u32),
    /// `Applications` shortcut position.
    pub applications_position: (u32, u32),
    /// `not-arranged`, `by-name` or `snap-to-grid`.
    pub arrangement: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        let layout = WindowLayout::default();
        Self {
            x: layout.window_origin.0,
            y: layout.window_origin.1,
            width: layout.window_size.0,
            height: layout.window_size.1,
            icon_size: layout.icon_size,
            app_position: layout.app_position,
            applications_position: layout.applications_position,
            arrangement: "not-arranged".to_string(),
        }
    }
}

impl WindowConfig {
    fn to_layout(&self) -> Result<WindowLayout> {
        let arrangement = match self.arrangement.as_str() {
            "not-arranged" => Arrangement::NotArranged,
            "by-name" => Arrangement::ByName,
            "snap-to-grid" => Arrangement::SnapToGrid,
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "dmg.window.arrangement".to_string(),
                    reason: format!(
                        "'{other}' is not one of not-arranged, by-name, snap-to-grid"
                    ),
                }
                .into());
            }
        };
        if self.width == 0 || self.height == 0 || self.icon_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dmg.window".to_string(),
                reason: "width, height and icon_size must be positive".to_string(),
            }
            .into());
        }
        if self.x.checked_add(self.width).is_none() || self.y.checked_add(self.height).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "dmg.window".to_string(),
                reason: "window extends past the largest screen coordinate".to_string(),
            }
            .into());
        }

        Ok(WindowLayout {
            window_origin: (self.x, self.y),
            window_size: (self.width, self.height),
            icon_size: self.icon_size,
            app_position: self.app_position,
            applications_position: self.applications_position,
            arrangement,
        })
    }
}

impl PackagingConfig {
    /// Loads the configuration the packaging binary should use.
    pub fn load() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            let path = PathBuf::from(path);
            log::debug!("Loading configuration from {} ({})", path.display(), CONFIG_ENV_VAR);
            return Self::from_file(&path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            log::debug!("Loading configuration from {}", local.display());
            return Self::from_file(local);
        }

        log::debug!("No configuration file, using built-in defaults");
        Ok(Self::default())
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(config)
    }

    /// Binary to package.
    pub fn resolved_binary_path(&self) -> PathBuf {
        self.binary_path.clone().unwrap_or_else(|| {
            self.project_directory
                .join("target")
                .join("release")
                .join(&self.executable_name)
        })
    }

    /// Icon to copy, if any.
    pub fn resolved_icon_path(&self) -> PathBuf {
        self.icon_path
            .clone()
            .unwrap_or_else(|| self.project_directory.join("src").join("icon.png"))
    }

    /// Directory the `.app` and `.dmg` land in.
    pub fn resolved_output_directory(&self) -> PathBuf {
        self.output_directory.clone().unwrap_or_else(|| {
            self.project_directory
                .join("target")
                .join("release")
                .join("bundle")
                .join("macos")
        })
    }

    /// Converts into bundler [`Settings`].
    pub fn into_settings(self) -> Result<Settings> {
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "identifier".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        if self.dmg.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dmg.poll_interval_ms".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        let layout = if self.dmg.customize {
            Some(self.dmg.window.to_layout()?)
        } else {
            None
        };

        let mut builder = SettingsBuilder::new()
            .project_out_directory(self.resolved_output_directory())
            .binary_path(self.resolved_binary_path())
            .icon_path(self.resolved_icon_path())
            .package_settings(PackageSettings {
                product_name: self.product_name,
                version: self.version,
                build_number: self.build_number,
                executable_name: self.executable_name,
                description: self.description,
            })
            .bundle_settings(BundleSettings {
                identifier: self.identifier,
                category: self.category,
                copyright: self.copyright,
                minimum_system_version: self.minimum_system_version,
                high_resolution_capable: self.high_resolution_capable,
            })
            .dmg_settings(DmgSettings {
                layout,
                mount_root: self.dmg.mount_root,
                mount_timeout: Duration::from_millis(self.dmg.mount_timeout_ms),
                poll_interval: Duration::from_millis(self.dmg.poll_interval_ms),
                settle_delay: Duration::from_millis(self.dmg.settle_delay_ms),
                cleanup_on_failure: self.cleanup_on_failure,
            });

        if !self.prebuilt {
            builder = builder.project_directory(&self.project_directory);
        }

        Ok(builder.build()?)
    }
}
