//! macOS DMG disk image creator.
//!
//! Builds a drag-to-install DMG in stages:
//!
//! ```text
//! Unbuilt -> WritableCreated -> Mounted -> Customized -> Unmounted -> Converted -> Cleaned
//! ```
//!
//! 1. Stage a copy of the .app plus an `Applications` symlink
//! 2. Create a UDRW (writable) image from the staging directory
//! 3. Attach it at a per-run mount point and poll until it appears
//! 4. Let a [`WindowCustomizer`] lay out the Finder window (best-effort)
//! 5. Detach, which always follows a successful attach
//! 6. Convert to UDZO at `<out>/<Product>-<Version>.dmg` and verify the format
//! 7. Remove the writable image and staging directory
//!
//! Staging directory, writable image and mount point all carry a [`RunId`],
//! so concurrent runs never share them.

use super::customize::{CustomizeOutcome, CustomizeTarget, WindowCustomizer};
use super::hdiutil::{AttachMode, ImageFormat, ImageTool};
use crate::bundler::{
    Stage,
    error::{Context, Error, ErrorExt, Result},
    settings::{Settings, WindowLayout},
    utils::fs,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::time::Instant;

/// Lifecycle of the disk image owned by a [`DiskImageBuilder`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DiskImageState {
    /// Nothing created yet.
    Unbuilt,
    /// Writable image exists on disk.
    WritableCreated,
    /// Writable image is attached.
    Mounted,
    /// Customization ran (whatever its outcome); still attached.
    Customized,
    /// Writable image detached.
    Unmounted,
    /// Compressed read-only image exists at the final path.
    Converted,
    /// Temporaries removed.
    Cleaned,
}

impl DiskImageState {
    /// Whether the volume is attached in this state.
    pub fn is_mounted(&self) -> bool {
        matches!(self, DiskImageState::Mounted | DiskImageState::Customized)
    }
}

impl fmt::Display for DiskImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiskImageState::Unbuilt => "unbuilt",
            DiskImageState::WritableCreated => "writable",
            DiskImageState::Mounted => "mounted",
            DiskImageState::Customized => "customized",
            DiskImageState::Unmounted => "unmounted",
            DiskImageState::Converted => "converted",
            DiskImageState::Cleaned => "cleaned",
        };
        f.write_str(name)
    }
}

/// Short random suffix that keeps one run's temporaries apart from another's.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RunId(String);

impl RunId {
    /// Generates a fresh 8-hex-digit id.
    pub fn generate() -> Self {
        let simple = uuid::Uuid::new_v4().simple().to_string();
        Self(simple[..8].to_string())
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exclusive owner of one run's disk-image state.
pub struct DiskImageBuilder<'a, T, C> {
    settings: &'a Settings,
    tool: &'a T,
    customizer: &'a C,
    run_id: RunId,
    state: DiskImageState,
    volume_name: Option<String>,
    app_name: Option<String>,
    staging_dir: Option<PathBuf>,
    writable_image: Option<PathBuf>,
    mount_point: Option<PathBuf>,
    final_image: Option<PathBuf>,
    customize_outcome: Option<CustomizeOutcome>,
}

impl<T, C> fmt::Debug for DiskImageBuilder<'_, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskImageBuilder")
            .field("run_id", &self.run_id)
            .field("state", &self.state)
            .field("staging_dir", &self.staging_dir)
            .field("writable_image", &self.writable_image)
            .field("mount_point", &self.mount_point)
            .field("final_image", &self.final_image)
            .finish()
    }
}

impl<'a, T: ImageTool, C: WindowCustomizer> DiskImageBuilder<'a, T, C> {
    /// Creates a builder with a fresh [`RunId`].
    pub fn new(settings: &'a Settings, tool: &'a T, customizer: &'a C) -> Self {
        Self::with_run_id(settings, tool, customizer, RunId::generate())
    }

    /// Creates a builder with an explicit [`RunId`].
    pub fn with_run_id(
        settings: &'a Settings,
        tool: &'a T,
        customizer: &'a C,
        run_id: RunId,
    ) -> Self {
        Self {
            settings,
            tool,
            customizer,
            run_id,
            state: DiskImageState::Unbuilt,
            volume_name: None,
            app_name: None,
            staging_dir: None,
            writable_image: None,
            mount_point: None,
            final_image: None,
            customize_outcome: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DiskImageState {
        self.state
    }

    /// This run's id.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Mount point, present only while mounted.
    pub fn mount_point(&self) -> Option<&Path> {
        self.mount_point.as_deref()
    }

    /// Outcome of the customization step, once it ran.
    pub fn customize_outcome(&self) -> Option<&CustomizeOutcome> {
        self.customize_outcome.as_ref()
    }

    /// Per-run staging directory inside the output directory.
    pub fn staging_dir_path(&self) -> PathBuf {
        self.settings
            .project_out_directory()
            .join(format!(".dmg-staging-{}", self.run_id))
    }

    /// Per-run writable image inside the output directory.
    pub fn writable_image_path(&self) -> PathBuf {
        self.settings.project_out_directory().join(format!(
            "{}-{}.rw.dmg",
            self.settings.product_name(),
            self.run_id
        ))
    }

    /// Per-run mount point for `volume_name`.
    pub fn mount_point_for(&self, volume_name: &str) -> PathBuf {
        self.settings
            .dmg()
            .mount_root
            .join(format!("{}-{}", volume_name, self.run_id))
    }

    /// Temporaries that currently exist on disk.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        [&self.writable_image, &self.staging_dir]
            .into_iter()
            .flatten()
            .filter(|p| p.exists())
            .cloned()
            .collect()
    }

    fn expect_state(&self, operation: &'static str, allowed: &[DiskImageState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state.to_string(),
            })
        }
    }

    /// Runs every stage for `app_bundle` and returns the final image path.
    ///
    /// On a fatal error the builder still detaches a mounted volume. Temporaries
    /// are kept for inspection unless `cleanup_on_failure` is set.
    pub async fn build(
        &mut self,
        app_bundle: &Path,
        progress: &mut dyn FnMut(Stage),
    ) -> Result<PathBuf> {
        match self.run_stages(app_bundle, progress).await {
            Ok(path) => Ok(path),
            Err(e) => {
                self.handle_failure().await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &mut self,
        app_bundle: &Path,
        progress: &mut dyn FnMut(Stage),
    ) -> Result<PathBuf> {
        let volume_name = self.settings.product_name().to_string();

        progress(Stage::CreatingImage);
        let image = self.create_writable_image(app_bundle, &volume_name).await?;

        progress(Stage::Mounting);
        self.mount(&image).await?;

        progress(Stage::Customizing);
        let layout = self.settings.dmg().layout.clone();
        let outcome = self.apply_window_layout(layout.as_ref()).await;
        match &outcome {
            CustomizeOutcome::Applied => log::info!("✓ DMG window layout applied"),
            CustomizeOutcome::Skipped(reason) => log::info!("DMG window layout skipped: {}", reason),
            CustomizeOutcome::Failed(reason) => {
                log::warn!("DMG window layout failed, continuing: {}", reason)
            }
        }

        progress(Stage::Unmounting);
        self.unmount().await?;

        progress(Stage::Converting);
        let final_image = self.convert_to_compressed_read_only().await?;

        progress(Stage::CleaningUp);
        self.cleanup().await?;

        Ok(final_image)
    }

    /// Stages `source_dir` (the .app) with an Applications shortcut and creates
    /// a writable image from it.
    pub async fn create_writable_image(
        &mut self,
        source_dir: &Path,
        volume_name: &str,
    ) -> Result<PathBuf> {
        self.expect_state("create writable image", &[DiskImageState::Unbuilt])?;

        let app_name = source_dir
            .file_name()
            .context("Invalid app bundle path")?
            .to_owned();

        let staging = self.staging_dir_path();
        fs::create_dir_all(&staging, true).await?;
        self.staging_dir = Some(staging.clone());

        let staged_app = staging.join(&app_name);
        log::debug!("Copying .app to staging: {}", staged_app.display());
        fs::copy_dir(source_dir, &staged_app).await.with_context(|| {
            format!(
                "copying .app bundle to staging directory: {}",
                staged_app.display()
            )
        })?;

        let applications_link = staging.join("Applications");
        fs::symlink(Path::new("/Applications"), &applications_link)
            .fs_context("creating Applications symlink", &applications_link)?;

        let image = self.writable_image_path();
        fs::remove_file(&image).await?;

        log::info!("Creating writable DMG {}", image.display());
        self.tool.create(&staging, volume_name, &image).await?;

        self.writable_image = Some(image.clone());
        self.volume_name = Some(volume_name.to_string());
        self.app_name = Some(app_name.to_string_lossy().into_owned());
        self.state = DiskImageState::WritableCreated;
        Ok(image)
    }

    /// Attaches `image` read-write and waits until its mount point exists.
    pub async fn mount(&mut self, image: &Path) -> Result<PathBuf> {
        self.expect_state("mount", &[DiskImageState::WritableCreated])?;

        let volume_name = self
            .volume_name
            .clone()
            .unwrap_or_else(|| self.settings.product_name().to_string());
        let mount_point = self.mount_point_for(&volume_name);

        log::debug!("Mounting DMG at {}", mount_point.display());
        self.tool
            .attach(image, &mount_point, AttachMode::ReadWrite)
            .await?;

        if let Err(e) = self.wait_for_mount(&mount_point).await {
            // attach returned success, so the image may be attached somewhere
            if let Err(detach_err) = self.tool.detach(&mount_point).await {
                log::debug!("Detach after mount timeout failed: {}", detach_err);
            }
            return Err(e);
        }

        log::debug!("DMG mounted at {}", mount_point.display());
        self.mount_point = Some(mount_point.clone());
        self.state = DiskImageState::Mounted;
        Ok(mount_point)
    }

    /// Polls for `mount_point` every `poll_interval` until `mount_timeout`.
    async fn wait_for_mount(&self, mount_point: &Path) -> Result<()> {
        let dmg = self.settings.dmg();
        let deadline = Instant::now() + dmg.mount_timeout;

        loop {
            if tokio::fs::metadata(mount_point).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::MountTimeout {
                    mount_point: mount_point.to_path_buf(),
                    timeout: dmg.mount_timeout,
                });
            }
            tokio::time::sleep(dmg.poll_interval).await;
        }
    }

    /// Hands the mounted volume to the customizer.
    ///
    /// Never fails: the outcome is recorded and the state advances to
    /// [`DiskImageState::Customized`] regardless.
    pub async fn apply_window_layout(&mut self, layout: Option<&WindowLayout>) -> CustomizeOutcome {
        let outcome = match (self.state, self.mount_point.as_deref(), layout) {
            (DiskImageState::Mounted, Some(mount_point), Some(layout)) => {
                let app_name = self
                    .app_name
                    .clone()
                    .unwrap_or_else(|| self.settings.app_bundle_name());
                let volume_name = self.volume_name.as_deref().unwrap_or_default();
                self.customizer
                    .customize(CustomizeTarget {
                        mount_point,
                        volume_name,
                        app_name: &app_name,
                        layout,
                    })
                    .await
            }
            (DiskImageState::Mounted, _, None) => {
                CustomizeOutcome::Skipped("no window layout configured".into())
            }
            (state, _, _) => CustomizeOutcome::Skipped(format!("image is {state}")),
        };

        if self.state == DiskImageState::Mounted {
            self.state = DiskImageState::Customized;
        }
        self.customize_outcome = Some(outcome.clone());
        outcome
    }

    /// Detaches the mounted volume.
    pub async fn unmount(&mut self) -> Result<()> {
        self.expect_state(
            "unmount",
            &[DiskImageState::Mounted, DiskImageState::Customized],
        )?;
        let mount_point = self.mount_point.clone().context("no mount point recorded")?;

        log::debug!("Detaching DMG...");
        self.tool.detach(&mount_point).await?;

        self.mount_point = None;
        self.state = DiskImageState::Unmounted;
        Ok(())
    }

    /// Converts the writable image into the final compressed read-only image
    /// and verifies its format.
    pub async fn convert_to_compressed_read_only(&mut self) -> Result<PathBuf> {
        self.expect_state("convert", &[DiskImageState::Unmounted])?;
        let image = self
            .writable_image
            .clone()
            .context("no writable image recorded")?;

        let final_image = self.settings.dmg_path();
        fs::remove_file(&final_image).await?;

        log::info!("Converting DMG to compressed format...");
        self.tool.convert(&image, &final_image).await?;

        let format = match self.tool.format(&final_image).await {
            Ok(format) => format,
            Err(e) => {
                self.discard_unverified(&final_image).await;
                return Err(e);
            }
        };
        if format != ImageFormat::Udzo {
            self.discard_unverified(&final_image).await;
            return Err(Error::DiskImage {
                operation: "verify final image".into(),
                code: None,
                stderr: format!(
                    "{} has format {}, expected {}",
                    final_image.display(),
                    format,
                    ImageFormat::Udzo
                ),
            });
        }

        log::info!("✓ Created {} DMG: {}", format, final_image.display());
        self.final_image = Some(final_image.clone());
        self.state = DiskImageState::Converted;
        Ok(final_image)
    }

    /// Only a verified UDZO image may stay at the final path.
    async fn discard_unverified(&self, final_image: &Path) {
        if let Err(e) = fs::remove_file(final_image).await {
            log::warn!(
                "Failed to remove unverified image {}: {}",
                final_image.display(),
                e
            );
        }
    }

    /// Removes the writable image and staging directory.
    pub async fn cleanup(&mut self) -> Result<()> {
        self.expect_state("clean up", &[DiskImageState::Converted])?;
        self.remove_temporaries().await?;
        self.state = DiskImageState::Cleaned;
        Ok(())
    }

    async fn remove_temporaries(&mut self) -> Result<()> {
        if let Some(image) = self.writable_image.take() {
            fs::remove_file(&image).await?;
        }
        if let Some(staging) = self.staging_dir.take() {
            fs::remove_dir_all(&staging).await?;
        }
        Ok(())
    }

    /// Fatal-error path: release the mount, then keep or discard temporaries.
    async fn handle_failure(&mut self) {
        if self.state.is_mounted()
            && let Some(mount_point) = self.mount_point.clone()
        {
            match self.tool.detach(&mount_point).await {
                Ok(()) => {
                    self.mount_point = None;
                    self.state = DiskImageState::Unmounted;
                }
                Err(e) => log::warn!("Failed to detach {}: {}", mount_point.display(), e),
            }
        }

        if self.settings.dmg().cleanup_on_failure {
            if let Err(e) = self.remove_temporaries().await {
                log::warn!("Failed to remove partial DMG artifacts: {}", e);
            }
            return;
        }

        for path in self.leftovers() {
            log::warn!("Leaving partial artifact for inspection: {}", path.display());
        }
    }
}
