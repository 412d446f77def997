//! Release build of the binary being packaged.

use crate::bundler::error::{Context, Error, Result};
use std::path::Path;

/// Runs `cargo build --release --bin <name>` in `project_dir`, where `<name>`
/// is the file name of `binary_path`.
///
/// The binary's presence is checked later by the bundle assembler, which
/// reports [`Error::MissingBinary`] if cargo put it somewhere else.
pub async fn build_release_binary(project_dir: &Path, binary_path: &Path) -> Result<()> {
    let bin_name = binary_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("binary path has no UTF-8 file name")?;

    log::info!(
        "Building {} in release mode ({})",
        bin_name,
        project_dir.display()
    );

    let output = tokio::process::Command::new("cargo")
        .current_dir(project_dir)
        .args(["build", "--release", "--bin", bin_name])
        .output()
        .await
        .map_err(|error| Error::CommandFailed {
            command: "cargo build".to_string(),
            error,
        })?;

    if !output.status.success() {
        return Err(Error::BuildFailed {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        });
    }

    Ok(())
}
