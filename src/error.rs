//! Error types for the packaging binaries.
//!
//! Wraps bundler failures together with configuration and CLI errors, and maps
//! each onto the process exit code and a few recovery hints.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packaging operations
pub type Result<T> = std::result::Result<T, PackagerError>;

/// Main error type for the packaging binaries
#[derive(Error, Debug)]
pub enum PackagerError {
    /// Bundler errors
    #[error("Bundler error: {0}")]
    Bundler(#[from] crate::bundler::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Could not read configuration file {}: {source}", path.display())]
    Unreadable {
        /// Path of the configuration file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for this schema
    #[error("Invalid configuration file {}: {source}", path.display())]
    Parse {
        /// Path of the configuration file
        path: PathBuf,
        /// Parser error
        #[source]
        source: toml::de::Error,
    },

    /// A field holds a value the pipeline cannot use
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Reason for the error
        reason: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },
}

impl PackagerError {
    /// Exit code for the process.
    ///
    /// A failing host tool hands its own exit code through; every other fatal
    /// error is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            PackagerError::Bundler(e) => e.exit_code(),
            _ => 1,
        }
    }

    /// Raw stderr of the failing host tool, if any.
    pub fn tool_stderr(&self) -> Option<&str> {
        match self {
            PackagerError::Bundler(e) => e.tool_stderr(),
            _ => None,
        }
    }

    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        use crate::bundler::Error as BundlerError;

        match self {
            PackagerError::Bundler(BundlerError::MissingBinary { path }) => vec![
                format!("Build the release binary first, expected at {}", path.display()),
                "Set prebuilt = false in Bundle.toml to let the bundler run cargo".to_string(),
            ],
            PackagerError::Bundler(BundlerError::MountTimeout { .. }) => vec![
                "Check for stale volumes: hdiutil info".to_string(),
                "Raise mount_timeout_ms in Bundle.toml on slow disks".to_string(),
            ],
            PackagerError::Bundler(BundlerError::BuildFailed { .. }) => vec![
                "Run cargo build --release manually to see the full compiler output".to_string(),
            ],
            PackagerError::Bundler(e) if e.is_disk_image_error() => vec![
                "Detach leftover volumes: hdiutil info, then hdiutil detach <device>".to_string(),
                "Remove stale *.rw.dmg files and .dmg-staging-* directories from the output directory"
                    .to_string(),
            ],
            PackagerError::Cli(CliError::InvalidArguments { .. }) => vec![
                "Pass the .dmg produced by cpu_limiter_bundler, e.g. \"CPU Limiter-0.1.0.dmg\""
                    .to_string(),
            ],
            PackagerError::Config(_) => vec![
                "Check Bundle.toml (or the file named by CPU_LIMITER_BUNDLE_CONFIG)".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
