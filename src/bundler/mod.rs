//! macOS packaging pipeline for the CPU Limiter binary.
//!
//! Turns a compiled executable into a `.app` bundle and then into a
//! compressed, read-only DMG with a drag-to-Applications layout.
//!
//! # Pipeline
//!
//! | Step | Output | Host tools |
//! |------|--------|------------|
//! | Compile (optional) | release binary | `cargo` |
//! | Assemble | `<Product>.app` | none |
//! | Disk image | `<Product>-<Version>.dmg` | `hdiutil`, `osascript` (optional) |
//!
//! Host tools sit behind the [`ImageTool`] and [`WindowCustomizer`] traits so
//! the whole pipeline can run against substitutes.
//!
//! # Integration
//!
//! ```no_run
//! use cpu_limiter_bundler::bundler::{Bundler, PackageSettings, SettingsBuilder};
//!
//! # async fn example() -> cpu_limiter_bundler::bundler::Result<()> {
//! let settings = SettingsBuilder::new()
//!     .project_out_directory("target/release/bundle")
//!     .binary_path("target/release/cpu-limiter")
//!     .package_settings(PackageSettings {
//!         product_name: "CPU Limiter".into(),
//!         version: "0.1.0".into(),
//!         build_number: "1".into(),
//!         executable_name: "cpu-limiter".into(),
//!         ..Default::default()
//!     })
//!     .build()?;
//!
//! let artifacts = Bundler::new(settings).bundle().await?;
//! # let _ = artifacts;
//! # Ok(())
//! # }
//! ```

mod builder;
pub mod compile;
pub mod error;
pub mod platform;
mod settings;
pub(crate) mod utils;

// Public re-exports
pub use builder::{Bundler, Stage, calculate_sha256};
pub use error::{Context, Error, ErrorExt, Result};
pub use platform::PackageType;
pub use platform::macos::{
    app::{AppBundle, assemble, bundle_project},
    customize::{
        CustomizeOutcome, CustomizeTarget, FinderCustomizer, NoCustomization, WindowCustomizer,
        finder_script,
    },
    dmg::{DiskImageBuilder, DiskImageState, RunId},
    hdiutil::{AttachMode, Hdiutil, ImageFormat, ImageTool, parse_image_format},
};
pub use settings::{
    Arrangement, BundleSettings, DmgSettings, PackageSettings, Settings, SettingsBuilder,
    WindowLayout,
};

/// A bundled artifact result.
///
/// Returned for each package the pipeline produced, in bundling order.
///
/// # Examples
///
/// ```no_run
/// use cpu_limiter_bundler::bundler::{Bundler, Settings};
///
/// # async fn example(settings: Settings) -> cpu_limiter_bundler::bundler::Result<()> {
/// for artifact in Bundler::new(settings).bundle().await? {
///     println!("Created {}: {} bytes", artifact.package_type, artifact.size);
///     println!("SHA256: {}", artifact.checksum);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BundledArtifact {
    /// The package type that was created.
    pub package_type: PackageType,

    /// Paths to all files created as part of this bundle.
    pub paths: Vec<std::path::PathBuf>,

    /// Total size of the artifact in bytes. For the `.app` this is the sum
    /// of every regular file inside it.
    pub size: u64,

    /// SHA-256 checksum of the artifact.
    pub checksum: String,
}
