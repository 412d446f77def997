//! # CPU Limiter bundler
//!
//! Packages the CPU Limiter binary into a macOS application bundle and a
//! compressed, Finder-customized disk image.
//!
//! ## Pipeline
//!
//! 1. Optionally build the release binary with cargo
//! 2. Assemble `<Product>.app` with its `Info.plist`
//! 3. Stage the bundle and an Applications shortcut into a writable image
//! 4. Mount it, lay out the Finder window (best-effort), unmount
//! 5. Convert to a zlib-compressed read-only image and verify its format
//!
//! ## Usage
//!
//! ```bash
//! cpu_limiter_bundler                                # build .app and .dmg
//! cpu_limiter_install "CPU Limiter-0.1.0.dmg"        # install into /Applications
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod install;

// Re-export main types for public API
pub use bundler::{BundledArtifact, Bundler, PackageType, Settings, SettingsBuilder};
pub use config::PackagingConfig;
pub use error::{ConfigError, CliError, PackagerError, Result};
