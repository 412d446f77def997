//! Pipeline tests driven through a fake disk image tool.
//!
//! The fake mirrors what `hdiutil` does to the file system (image files appear,
//! mount points appear and vanish) so the state machine can run on any host.

#![cfg(unix)]

#[cfg(test)]
mod tests {
    use cpu_limiter_bundler::bundler::{
        AppBundle, AttachMode, Bundler, CustomizeOutcome, CustomizeTarget, DiskImageBuilder,
        DiskImageState, DmgSettings, Error, ImageFormat, ImageTool, NoCustomization,
        PackageSettings, PackageType, Result, RunId, Settings, SettingsBuilder, Stage,
        WindowCustomizer, WindowLayout, assemble,
    };
    use cpu_limiter_bundler::install::install_from_dmg;
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        Create,
        Attach(AttachMode),
        Detach,
        Convert,
        Format,
    }

    #[derive(Default)]
    struct FakeTool {
        calls: Mutex<Vec<Call>>,
        fail_attach: Option<i32>,
        never_mount: bool,
        fail_convert: Option<i32>,
        wrong_format: bool,
        volume_contents: Option<PathBuf>,
    }

    impl FakeTool {
        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn tool_error(operation: &str, code: i32) -> Error {
            Error::DiskImage {
                operation: operation.into(),
                code: Some(code),
                stderr: format!("hdiutil: {operation} failed - simulated"),
            }
        }
    }

    impl ImageTool for FakeTool {
        async fn create(&self, source_dir: &Path, volume_name: &str, image: &Path) -> Result<()> {
            self.record(Call::Create);
            assert!(source_dir.join("Applications").symlink_metadata().is_ok());
            std::fs::write(image, format!("UDRW\n{volume_name}\n"))?;
            Ok(())
        }

        async fn attach(&self, image: &Path, mount_point: &Path, mode: AttachMode) -> Result<()> {
            self.record(Call::Attach(mode));
            assert!(image.is_file());
            if let Some(code) = self.fail_attach {
                return Err(Self::tool_error("hdiutil attach", code));
            }
            if !self.never_mount {
                std::fs::create_dir_all(mount_point)?;
                if let Some(contents) = &self.volume_contents {
                    copy_tree(contents, mount_point);
                }
            }
            Ok(())
        }

        async fn detach(&self, mount_point: &Path) -> Result<()> {
            self.record(Call::Detach);
            if mount_point.exists() {
                std::fs::remove_dir_all(mount_point)?;
            }
            Ok(())
        }

        async fn convert(&self, image: &Path, output: &Path) -> Result<()> {
            self.record(Call::Convert);
            assert!(!output.exists(), "convert must not overwrite");
            if let Some(code) = self.fail_convert {
                return Err(Self::tool_error("hdiutil convert", code));
            }
            let body = std::fs::read_to_string(image)?;
            let format = if self.wrong_format { "UDRW" } else { "UDZO" };
            let rest = body.split_once('\n').map(|(_, r)| r).unwrap_or_default();
            std::fs::write(output, format!("{format}\n{rest}"))?;
            Ok(())
        }

        async fn format(&self, image: &Path) -> Result<ImageFormat> {
            self.record(Call::Format);
            let body = std::fs::read_to_string(image)?;
            Ok(ImageFormat::from_code(body.lines().next().unwrap_or_default()))
        }
    }

    struct FailingCustomizer;

    impl WindowCustomizer for FailingCustomizer {
        async fn customize(&self, target: CustomizeTarget<'_>) -> CustomizeOutcome {
            assert!(target.mount_point.is_dir());
            CustomizeOutcome::Failed("Finder got an error: Can't get disk".into())
        }
    }

    struct CheckingCustomizer;

    impl WindowCustomizer for CheckingCustomizer {
        async fn customize(&self, target: CustomizeTarget<'_>) -> CustomizeOutcome {
            assert!(target.mount_point.is_dir());
            assert_eq!(target.volume_name, "CPU Limiter");
            assert_eq!(target.app_name, "CPU Limiter.app");
            CustomizeOutcome::Applied
        }
    }

    fn copy_tree(from: &Path, to: &Path) {
        for entry in walkdir::WalkDir::new(from) {
            let entry = entry.unwrap();
            let dest = to.join(entry.path().strip_prefix(from).unwrap());
            if entry.file_type().is_symlink() {
                let target = std::fs::read_link(entry.path()).unwrap();
                std::os::unix::fs::symlink(target, &dest).unwrap();
            } else if entry.file_type().is_dir() {
                std::fs::create_dir_all(&dest).unwrap();
            } else {
                std::fs::copy(entry.path(), &dest).unwrap();
            }
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().to_path_buf();
            std::fs::write(root.join("cpu-limiter"), b"\xCF\xFA\xED\xFE fake mach-o").unwrap();
            std::fs::write(root.join("icon.png"), b"\x89PNG fake icon").unwrap();
            Self { _tmp: tmp, root }
        }

        fn out(&self) -> PathBuf {
            self.root.join("out")
        }

        fn settings(&self, dmg: DmgSettings) -> Settings {
            self.settings_in(&self.out(), dmg)
        }

        fn settings_in(&self, out: &Path, dmg: DmgSettings) -> Settings {
            SettingsBuilder::new()
                .project_out_directory(out)
                .binary_path(self.root.join("cpu-limiter"))
                .icon_path(self.root.join("icon.png"))
                .package_settings(PackageSettings {
                    product_name: "CPU Limiter".into(),
                    version: "0.1.0".into(),
                    build_number: "1".into(),
                    executable_name: "cpu-limiter".into(),
                    description: String::new(),
                })
                .dmg_settings(dmg)
                .build()
                .unwrap()
        }

        fn dmg_settings(&self) -> DmgSettings {
            DmgSettings {
                layout: Some(WindowLayout::default()),
                mount_root: self.root.join("volumes"),
                mount_timeout: Duration::from_millis(200),
                poll_interval: Duration::from_millis(10),
                settle_delay: Duration::ZERO,
                cleanup_on_failure: false,
            }
        }
    }

    fn entries(dir: &Path) -> BTreeSet<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_successful_run_leaves_only_app_and_udzo_image() {
        let fx = Fixture::new();
        let tool = FakeTool::default();
        let bundler = Bundler::with_tools(fx.settings(fx.dmg_settings()), tool, CheckingCustomizer);

        let artifacts = bundler.bundle().await.unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[0].package_type, PackageType::MacOsBundle);
        assert_eq!(artifacts[1].package_type, PackageType::Dmg);

        let dmg = fx.out().join("CPU Limiter-0.1.0.dmg");
        assert_eq!(artifacts[1].paths, vec![dmg.clone()]);
        assert_eq!(artifacts[1].checksum.len(), 64);
        assert_eq!(
            entries(&fx.out()),
            BTreeSet::from(["CPU Limiter.app".to_string(), "CPU Limiter-0.1.0.dmg".to_string()])
        );
        assert_eq!(
            FakeTool::default().format(&dmg).await.unwrap(),
            ImageFormat::Udzo
        );
        assert!(entries(&fx.root.join("volumes")).is_empty());
    }

    #[tokio::test]
    async fn test_stage_markers_in_order() {
        let fx = Fixture::new();
        let bundler = Bundler::with_tools(
            fx.settings(fx.dmg_settings()),
            FakeTool::default(),
            NoCustomization,
        );

        let mut stages = Vec::new();
        bundler
            .bundle_with_progress(&mut |stage| stages.push(stage))
            .await
            .unwrap();

        assert_eq!(
            stages,
            vec![
                Stage::Assembling,
                Stage::CreatingImage,
                Stage::Mounting,
                Stage::Customizing,
                Stage::Unmounting,
                Stage::Converting,
                Stage::CleaningUp,
            ]
        );
    }

    #[tokio::test]
    async fn test_descriptor_names_copied_executable() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let path = assemble(settings.binary_path(), settings.icon_path(), &settings)
            .await
            .unwrap();
        let bundle = AppBundle::at(&path);

        let plist = plist::Value::from_file(bundle.info_plist_path()).unwrap();
        let executable = plist
            .as_dictionary()
            .and_then(|d| d.get("CFBundleExecutable"))
            .and_then(|v| v.as_string())
            .unwrap()
            .to_string();

        let copied: Vec<_> = std::fs::read_dir(bundle.macos_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(copied, vec![executable]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(bundle.executable_path("cpu-limiter"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn test_missing_binary_creates_nothing() {
        let fx = Fixture::new();
        std::fs::remove_file(fx.root.join("cpu-limiter")).unwrap();
        let tool = FakeTool::default();
        let bundler = Bundler::with_tools(fx.settings(fx.dmg_settings()), tool, NoCustomization);

        let err = bundler.bundle().await.unwrap_err();
        assert!(matches!(err, Error::MissingBinary { .. }));
        assert_eq!(err.exit_code(), 1);
        assert!(!fx.out().exists());
    }

    #[tokio::test]
    async fn test_identical_inputs_give_identical_bundle_bytes() {
        let fx = Fixture::new();
        let mut bundles = Vec::new();
        for run in ["first", "second"] {
            let settings = fx.settings_in(&fx.root.join(run), fx.dmg_settings());
            let bundler = Bundler::with_tools(settings, FakeTool::default(), NoCustomization);
            let artifacts = bundler.bundle().await.unwrap();
            bundles.push(AppBundle::at(&artifacts[0].paths[0]));
        }

        let read = |p: PathBuf| std::fs::read(p).unwrap();
        assert_eq!(
            read(bundles[0].executable_path("cpu-limiter")),
            read(bundles[1].executable_path("cpu-limiter"))
        );
        assert_eq!(read(bundles[0].icon_path()), read(bundles[1].icon_path()));
    }

    async fn app_bundle(settings: &Settings) -> PathBuf {
        assemble(settings.binary_path(), settings.icon_path(), settings)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failing_customizer_still_unmounts_and_converts() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let app = app_bundle(&settings).await;
        let tool = FakeTool::default();

        let mut builder = DiskImageBuilder::new(&settings, &tool, &FailingCustomizer);
        let dmg = builder.build(&app, &mut |_| {}).await.unwrap();

        assert!(dmg.is_file());
        assert_eq!(builder.state(), DiskImageState::Cleaned);
        assert!(matches!(
            builder.customize_outcome(),
            Some(CustomizeOutcome::Failed(_))
        ));
        assert_eq!(
            tool.calls(),
            vec![
                Call::Create,
                Call::Attach(AttachMode::ReadWrite),
                Call::Detach,
                Call::Convert,
                Call::Format,
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_layout_skips_customization() {
        let fx = Fixture::new();
        let mut dmg = fx.dmg_settings();
        dmg.layout = None;
        let settings = fx.settings(dmg);
        let app = app_bundle(&settings).await;
        let tool = FakeTool::default();

        let mut builder = DiskImageBuilder::new(&settings, &tool, &FailingCustomizer);
        builder.build(&app, &mut |_| {}).await.unwrap();
        assert!(matches!(
            builder.customize_outcome(),
            Some(CustomizeOutcome::Skipped(_))
        ));
    }

    #[tokio::test]
    async fn test_mount_timeout_is_fatal_and_keeps_writable_image() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            never_mount: true,
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        let err = builder.build(&app, &mut |_| {}).await.unwrap_err();

        assert!(matches!(err, Error::MountTimeout { .. }));
        assert!(err.is_disk_image_error());
        assert_eq!(builder.state(), DiskImageState::WritableCreated);
        assert!(builder.writable_image_path().is_file());
        assert!(builder.staging_dir_path().is_dir());
        assert!(!tool.calls().contains(&Call::Convert));
        assert!(!settings.dmg_path().exists());
    }

    #[tokio::test]
    async fn test_attach_failure_propagates_tool_exit_code() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            fail_attach: Some(16),
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        let err = builder.build(&app, &mut |_| {}).await.unwrap_err();

        assert_eq!(err.exit_code(), 16);
        assert_eq!(err.tool_stderr(), Some("hdiutil: hdiutil attach failed - simulated"));
        assert_eq!(
            tool.calls(),
            vec![Call::Create, Call::Attach(AttachMode::ReadWrite)]
        );
        assert_eq!(builder.leftovers().len(), 2);
    }

    #[tokio::test]
    async fn test_convert_failure_keeps_writable_image_by_default() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            fail_convert: Some(2),
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        let err = builder.build(&app, &mut |_| {}).await.unwrap_err();

        assert_eq!(err.exit_code(), 2);
        assert_eq!(builder.state(), DiskImageState::Unmounted);
        assert!(builder.writable_image_path().is_file());
        assert!(!settings.dmg_path().exists());
    }

    #[tokio::test]
    async fn test_cleanup_on_failure_removes_temporaries() {
        let fx = Fixture::new();
        let mut dmg = fx.dmg_settings();
        dmg.cleanup_on_failure = true;
        let settings = fx.settings(dmg);
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            fail_convert: Some(1),
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        builder.build(&app, &mut |_| {}).await.unwrap_err();

        assert!(!builder.writable_image_path().exists());
        assert!(!builder.staging_dir_path().exists());
        assert!(builder.leftovers().is_empty());
        assert_eq!(entries(&fx.out()), BTreeSet::from(["CPU Limiter.app".to_string()]));
    }

    #[tokio::test]
    async fn test_wrong_final_format_is_rejected() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            wrong_format: true,
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        let err = builder.build(&app, &mut |_| {}).await.unwrap_err();
        match err {
            Error::DiskImage { operation, .. } => assert_eq!(operation, "verify final image"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!settings.dmg_path().exists());
    }

    #[tokio::test]
    async fn test_wrong_final_format_is_removed_with_cleanup_on_failure() {
        let fx = Fixture::new();
        let mut dmg = fx.dmg_settings();
        dmg.cleanup_on_failure = true;
        let settings = fx.settings(dmg);
        let app = app_bundle(&settings).await;
        let tool = FakeTool {
            wrong_format: true,
            ..Default::default()
        };

        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        assert!(builder.build(&app, &mut |_| {}).await.is_err());
        assert!(!settings.dmg_path().exists());
        assert_eq!(entries(&fx.out()), BTreeSet::from(["CPU Limiter.app".to_string()]));
    }

    #[tokio::test]
    async fn test_operations_out_of_order_are_rejected() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let tool = FakeTool::default();
        let mut builder = DiskImageBuilder::new(&settings, &tool, &NoCustomization);

        assert!(matches!(
            builder.unmount().await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            builder.convert_to_compressed_read_only().await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            builder.mount(&fx.root.join("x.rw.dmg")).await,
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            builder.apply_window_layout(Some(&WindowLayout::default())).await,
            CustomizeOutcome::Skipped(_)
        ));
        assert_eq!(builder.state(), DiskImageState::Unbuilt);
        assert!(tool.calls().is_empty());
    }

    #[test]
    fn test_runs_use_distinct_temporaries() {
        let fx = Fixture::new();
        let settings = fx.settings(fx.dmg_settings());
        let tool = FakeTool::default();
        let a = DiskImageBuilder::new(&settings, &tool, &NoCustomization);
        let b = DiskImageBuilder::new(&settings, &tool, &NoCustomization);

        assert_ne!(a.staging_dir_path(), b.staging_dir_path());
        assert_ne!(a.writable_image_path(), b.writable_image_path());
        assert_ne!(a.mount_point_for("CPU Limiter"), b.mount_point_for("CPU Limiter"));

        let fixed = DiskImageBuilder::with_run_id(
            &settings,
            &tool,
            &NoCustomization,
            RunId::generate(),
        );
        let id = fixed.run_id().to_string();
        assert!(fixed
            .writable_image_path()
            .ends_with(format!("CPU Limiter-{id}.rw.dmg")));
        assert_eq!(
            fixed.mount_point_for("CPU Limiter"),
            fx.root.join("volumes").join(format!("CPU Limiter-{id}"))
        );
    }

    fn volume_with_app(root: &Path) -> PathBuf {
        let volume = root.join("volume");
        let app = AppBundle::at(volume.join("CPU Limiter.app"));
        std::fs::create_dir_all(app.macos_dir()).unwrap();
        std::fs::write(app.executable_path("cpu-limiter"), b"v2").unwrap();
        std::os::unix::fs::symlink("/Applications", volume.join("Applications")).unwrap();
        volume
    }

    #[tokio::test]
    async fn test_install_replaces_existing_app() {
        let fx = Fixture::new();
        let dmg = fx.root.join("CPU Limiter-0.1.0.dmg");
        std::fs::write(&dmg, b"UDZO\n").unwrap();
        let applications = fx.root.join("Applications");
        let stale = AppBundle::at(applications.join("CPU Limiter.app"));
        std::fs::create_dir_all(stale.macos_dir()).unwrap();
        std::fs::write(stale.macos_dir().join("old-helper"), b"v1").unwrap();

        let tool = FakeTool {
            volume_contents: Some(volume_with_app(&fx.root)),
            ..Default::default()
        };

        let installed = install_from_dmg(&tool, &dmg, &applications).await.unwrap();

        assert_eq!(installed, applications.join("CPU Limiter.app"));
        assert_eq!(
            std::fs::read(stale.executable_path("cpu-limiter")).unwrap(),
            b"v2"
        );
        assert!(!stale.macos_dir().join("old-helper").exists());
        assert_eq!(
            tool.calls(),
            vec![Call::Attach(AttachMode::ReadOnlyHidden), Call::Detach]
        );
    }

    #[tokio::test]
    async fn test_install_detaches_when_volume_has_no_app() {
        let fx = Fixture::new();
        let dmg = fx.root.join("empty.dmg");
        std::fs::write(&dmg, b"UDZO\n").unwrap();
        let applications = fx.root.join("Applications");
        std::fs::create_dir_all(&applications).unwrap();

        let tool = FakeTool::default();
        let err = install_from_dmg(&tool, &dmg, &applications)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no .app bundle"));
        assert_eq!(
            tool.calls(),
            vec![Call::Attach(AttachMode::ReadOnlyHidden), Call::Detach]
        );
        assert!(entries(&applications).is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_missing_image() {
        let fx = Fixture::new();
        let tool = FakeTool::default();
        let err = install_from_dmg(&tool, &fx.root.join("absent.dmg"), &fx.root)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fs { .. }));
        assert!(tool.calls().is_empty());
    }
}
