//! Command line argument parsing.
//!
//! The packaging binary takes no flags: everything it needs comes from
//! `Bundle.toml` or the built-in defaults. The install helper takes the image
//! path and nothing else.

use clap::Parser;
use std::path::PathBuf;

/// Builds the CPU Limiter .app bundle and distributable DMG
#[derive(Parser, Debug, Default)]
#[command(
    name = "cpu_limiter_bundler",
    version,
    about = "Builds the CPU Limiter .app bundle and distributable DMG",
    long_about = "Builds the CPU Limiter .app bundle and a compressed, Finder-customized DMG.

Configuration is read from the file named by CPU_LIMITER_BUNDLE_CONFIG, or from
Bundle.toml in the working directory, falling back to built-in defaults.
Set RUST_LOG=debug for detailed logs."
)]
pub struct BundleArgs {}

/// Installs CPU Limiter from a DMG into /Applications
#[derive(Parser, Debug)]
#[command(
    name = "cpu_limiter_install",
    version,
    about = "Installs CPU Limiter from a DMG into /Applications"
)]
pub struct InstallArgs {
    /// Disk image produced by cpu_limiter_bundler
    #[arg(index = 1, value_name = "DMG")]
    pub dmg: PathBuf,
}

/// Configuration shared by both command executors
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print error message
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }
}
