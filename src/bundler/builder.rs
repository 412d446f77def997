//! Bundle orchestration and coordination.
//!
//! The [`Bundler`] runs the pipeline strictly in order:
//!
//! 1. Compile the binary (skipped when it is prebuilt)
//! 2. Assemble the `.app` bundle
//! 3. Build the DMG from it
//! 4. Calculate sizes and checksums for both artifacts
//!
//! The first fatal error aborts the run. Window customization inside step 3
//! never does.
//!
//! # Example
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
//! let bundler = Bundler::new(settings);
//! for artifact in bundler.bundle().await? {
//!     println!("Created: {} ({} bytes)", artifact.package_type, artifact.size);
//!     println!("SHA256: {}", artifact.checksum);
//! }
//! # Ok(())
//! # }
//! ```

use crate::bail;
use crate::bundler::{
    BundledArtifact, PackageType, Result, Settings,
    compile,
    error::ErrorExt,
    platform::macos::{
        app,
        customize::{FinderCustomizer, WindowCustomizer},
        dmg::DiskImageBuilder,
        hdiutil::{Hdiutil, ImageTool},
    },
};
use std::fmt;
use std::path::{Path, PathBuf};

/// Pipeline stages, reported to the caller as they start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Building the release binary.
    Compiling,
    /// Assembling the .app bundle.
    Assembling,
    /// Staging and creating the writable image.
    CreatingImage,
    /// Attaching the writable image.
    Mounting,
    /// Applying the Finder window layout.
    Customizing,
    /// Detaching the writable image.
    Unmounting,
    /// Converting to the compressed read-only image.
    Converting,
    /// Removing temporaries.
    CleaningUp,
}

impl Stage {
    /// Short progress marker for this stage.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Compiling => "Building release binary",
            Stage::Assembling => "Assembling app bundle",
            Stage::CreatingImage => "Creating writable disk image",
            Stage::Mounting => "Mounting disk image",
            Stage::Customizing => "Customizing Finder window",
            Stage::Unmounting => "Unmounting disk image",
            Stage::Converting => "Compressing disk image",
            Stage::CleaningUp => "Cleaning up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Main bundler orchestrator.
///
/// Generic over the disk image tool and the window customizer so the same
/// pipeline runs against `hdiutil`/Finder in production and against fakes in
/// tests.
pub struct Bundler<T = Hdiutil, C = FinderCustomizer> {
    settings: Settings,
    tool: T,
    customizer: C,
}

impl<T, C> fmt::Debug for Bundler<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Bundler {
    /// Creates a bundler that drives `hdiutil` and Finder.
    pub fn new(settings: Settings) -> Self {
        let customizer = FinderCustomizer::new(settings.dmg().settle_delay);
        Self::with_tools(settings, Hdiutil, customizer)
    }
}

impl<T: ImageTool, C: WindowCustomizer> Bundler<T, C> {
    /// Creates a bundler with explicit host tool implementations.
    pub fn with_tools(settings: Settings, tool: T, customizer: C) -> Self {
        Self {
            settings,
            tool,
            customizer,
        }
    }

    /// Returns a reference to the bundler settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the whole pipeline.
    pub async fn bundle(&self) -> Result<Vec<BundledArtifact>> {
        self.bundle_with_progress(&mut |stage| log::debug!("{}", stage))
            .await
    }

    /// Runs the whole pipeline, calling `progress` as each stage starts.
    ///
    /// Returns the .app artifact followed by the .dmg artifact.
    pub async fn bundle_with_progress(
        &self,
        progress: &mut dyn FnMut(Stage),
    ) -> Result<Vec<BundledArtifact>> {
        if let Some(project_dir) = self.settings.project_directory() {
            progress(Stage::Compiling);
            compile::build_release_binary(project_dir, self.settings.binary_path()).await?;
        }

        progress(Stage::Assembling);
        let app_bundle = app::bundle_project(&self.settings).await?;
        let app_artifact = describe_artifact(PackageType::MacOsBundle, app_bundle.clone()).await?;

        let mut dmg_builder = DiskImageBuilder::new(&self.settings, &self.tool, &self.customizer);
        log::debug!("Disk image run id {}", dmg_builder.run_id());
        let dmg_path = dmg_builder.build(&app_bundle, progress).await?;
        let dmg_artifact = describe_artifact(PackageType::Dmg, dmg_path).await?;

        Ok(vec![app_artifact, dmg_artifact])
    }
}

async fn describe_artifact(package_type: PackageType, path: PathBuf) -> Result<BundledArtifact> {
    let size = artifact_size(&path).await?;
    let checksum = calculate_sha256(&path).await?;
    Ok(BundledArtifact {
        package_type,
        paths: vec![path],
        size,
        checksum,
    })
}

/// Total size in bytes of a file, or of every file under a directory.
async fn artifact_size(path: &Path) -> Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading artifact metadata", path)?;

    if metadata.is_file() {
        return Ok(metadata.len());
    }

    let mut size = 0u64;
    for entry in walkdir::WalkDir::new(path).follow_links(false) {
        let entry = entry?;
        if entry.file_type().is_file() {
            size += entry.metadata()?.len();
        }
    }
    Ok(size)
}

/// Calculates SHA256 checksum of a file or directory.
///
/// For files: Reads in 8KB chunks and computes the SHA-256 hash.
/// For directories: Recursively hashes all files in deterministic order.
pub async fn calculate_sha256(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let metadata = tokio::fs::metadata(path)
        .await
        .fs_context("reading metadata for hashing", path)?;

    if metadata.is_file() {
        let mut file = tokio::fs::File::open(path)
            .await
            .fs_context("opening file for hashing", path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 8192];

        loop {
            let n = file
                .read(&mut buffer)
                .await
                .fs_context("reading file for hash calculation", path)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    } else if metadata.is_dir() {
        calculate_directory_sha256(path).await
    } else {
        bail!("Path is neither file nor directory: {}", path.display())
    }
}

/// Calculates SHA256 checksum of a directory tree.
///
/// Each file contributes its relative path and its contents, in sorted path
/// order, so the digest depends only on the tree's layout and bytes.
async fn calculate_directory_sha256(dir_path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};
    use tokio::io::AsyncReadExt;

    let mut entries: Vec<_> = walkdir::WalkDir::new(dir_path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .collect();

    entries.sort_by_key(|e| e.path().to_path_buf());

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    for entry in entries {
        if let Ok(rel_path) = entry.path().strip_prefix(dir_path) {
            hasher.update(rel_path.to_string_lossy().as_bytes());
        }

        let mut file = tokio::fs::File::open(entry.path())
            .await
            .fs_context("opening file for hashing", entry.path())?;

        loop {
            let n = file
                .read(&mut buffer)
                .await
                .fs_context("reading file for hash calculation", entry.path())?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}
