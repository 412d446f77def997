//! Finder window customization for a mounted disk image.
//!
//! Customization is cosmetic. [`WindowCustomizer::customize`] reports a
//! [`CustomizeOutcome`] instead of a `Result`, so a failing customizer cannot
//! short-circuit the unmount and convert steps that follow it.

use crate::bundler::settings::WindowLayout;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::process::Output;
use std::time::Duration;

/// What a customization attempt did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CustomizeOutcome {
    /// The layout was applied.
    Applied,
    /// Nothing was attempted.
    Skipped(String),
    /// The attempt failed; the image is still valid.
    Failed(String),
}

impl fmt::Display for CustomizeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CustomizeOutcome::Applied => write!(f, "applied"),
            CustomizeOutcome::Skipped(reason) => write!(f, "skipped ({reason})"),
            CustomizeOutcome::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// The mounted volume a customizer works on.
#[derive(Clone, Copy, Debug)]
pub struct CustomizeTarget<'a> {
    /// Where the writable image is mounted.
    pub mount_point: &'a Path,
    /// Volume label of the image.
    pub volume_name: &'a str,
    /// File name of the `.app` at the volume root.
    pub app_name: &'a str,
    /// Layout to apply.
    pub layout: &'a WindowLayout,
}

/// Customize-or-skip capability applied between mount and unmount.
pub trait WindowCustomizer {
    /// Applies `target.layout` to the mounted volume.
    fn customize(
        &self,
        target: CustomizeTarget<'_>,
    ) -> impl Future<Output = CustomizeOutcome> + Send;
}

/// Customizer that never touches the volume.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCustomization;

impl WindowCustomizer for NoCustomization {
    async fn customize(&self, _target: CustomizeTarget<'_>) -> CustomizeOutcome {
        CustomizeOutcome::Skipped("customization disabled".into())
    }
}

/// Drives Finder through `osascript`.
#[derive(Clone, Debug)]
pub struct FinderCustomizer {
    settle_delay: Duration,
    timeout: Duration,
}

impl FinderCustomizer {
    /// Creates a customizer that waits `settle_delay` after a successful script
    /// so Finder can write `.DS_Store` before the volume is detached.
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            timeout: Duration::from_secs(60),
        }
    }
}

impl Default for FinderCustomizer {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl WindowCustomizer for FinderCustomizer {
    async fn customize(&self, target: CustomizeTarget<'_>) -> CustomizeOutcome {
        let osascript = match which::which("osascript") {
            Ok(path) => path,
            Err(e) => return CustomizeOutcome::Skipped(format!("osascript not available: {e}")),
        };

        let script = finder_script(target);
        log::debug!("Customizing Finder window for volume {}", target.volume_name);

        let mut command = tokio::process::Command::new(osascript);
        command.arg("-e").arg(&script);

        let output = match run_bounded(command, self.timeout).await {
            Ok(output) => output,
            Err(reason) => return CustomizeOutcome::Failed(reason),
        };

        if !output.status.success() {
            return CustomizeOutcome::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            );
        }

        // Finder writes .DS_Store asynchronously
        tokio::time::sleep(self.settle_delay).await;
        CustomizeOutcome::Applied
    }
}

/// Runs `command` to completion, killing it once `timeout` elapses.
async fn run_bounded(
    mut command: tokio::process::Command,
    timeout: Duration,
) -> std::result::Result<Output, String> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    // the child is killed when the timed-out future drops it
    let run = command.kill_on_drop(true).output();

    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("failed to run {program}: {e}")),
        Err(_) => Err(format!("{program} did not finish within {timeout:?}")),
    }
}

/// Escape special characters for AppleScript string literals
///
/// ```
/// # fn escape_applescript_string(s: &str) -> String {
/// #     s.replace('\\', r"\\").replace('"', r#"\""#)
/// # }
/// assert_eq!(escape_applescript_string("My\"App"), "My\\\"App");
/// ```
fn escape_applescript_string(s: &str) -> String {
    s.replace('\\', r"\\").replace('"', r#"\""#)
}

/// Builds the Finder script for `target`.
///
/// The volume is addressed through its mount point rather than its label so
/// that two mounted images with the same label cannot be confused.
pub fn finder_script(target: CustomizeTarget<'_>) -> String {
    let layout = target.layout;
    let (left, top, right, bottom) = layout.bounds();
    let (app_x, app_y) = layout.app_position;
    let (apps_x, apps_y) = layout.applications_position;

    format!(
        r#"
        tell application "Finder"
            set mountFolder to (POSIX file "{mount_point}" as alias)
            tell folder mountFolder
                open
                set current view of container window to icon view
                set toolbar visible of container window to false
                set statusbar visible of container window to false
                set bounds of container window to {{{left}, {top}, {right}, {bottom}}}
                set viewOptions to icon view options of container window
                set arrangement of viewOptions to {arrangement}
                set icon size of viewOptions to {icon_size}
                set position of item "{app_name}" to {{{app_x}, {app_y}}}
                set position of item "Applications" to {{{apps_x}, {apps_y}}}
                close
                open
                update without registering applications
            end tell
        end tell
        "#,
        mount_point = escape_applescript_string(&target.mount_point.to_string_lossy()),
        arrangement = layout.arrangement.as_applescript(),
        icon_size = layout.icon_size,
        app_name = escape_applescript_string(target.app_name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finder_script_contents() {
        let layout = WindowLayout::default();
        let script = finder_script(CustomizeTarget {
            mount_point: Path::new("/Volumes/CPU Limiter-1a2b3c4d"),
            volume_name: "CPU Limiter",
            app_name: "CPU \"Limiter\".app",
            layout: &layout,
        });

        assert!(script.contains(r#"POSIX file "/Volumes/CPU Limiter-1a2b3c4d""#));
        assert!(script.contains("set bounds of container window to {400, 100, 900, 400}"));
        assert!(script.contains("set arrangement of viewOptions to not arranged"));
        assert!(script.contains("set icon size of viewOptions to 100"));
        assert!(script.contains(r#"set position of item "CPU \"Limiter\".app" to {125, 150}"#));
        assert!(script.contains(r#"set position of item "Applications" to {375, 150}"#));
        assert!(script.contains("set toolbar visible of container window to false"));
        assert!(script.contains("set statusbar visible of container window to false"));
    }

    #[tokio::test]
    async fn test_no_customization_skips() {
        let layout = WindowLayout::default();
        let outcome = NoCustomization
            .customize(CustomizeTarget {
                mount_point: Path::new("/tmp"),
                volume_name: "v",
                app_name: "v.app",
                layout: &layout,
            })
            .await;
        assert!(matches!(outcome, CustomizeOutcome::Skipped(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_script_is_killed() {
        let tmp = tempfile::tempdir().unwrap();
        let marker = tmp.path().join("finished");

        let mut command = tokio::process::Command::new("sh");
        command
            .arg("-c")
            .arg(format!("sleep 1; touch '{}'", marker.display()));

        let err = run_bounded(command, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.contains("did not finish"));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_bounded_run_reports_spawn_failure() {
        let command = tokio::process::Command::new("/nonexistent/osascript");
        let err = run_bounded(command, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.starts_with("failed to run /nonexistent/osascript"));
    }
}
