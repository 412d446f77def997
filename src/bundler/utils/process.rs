//! Host tool invocation.

use crate::bundler::error::{Error, Result};
use std::ffi::OsStr;
use std::process::Output;

/// Runs `program` with `args` and waits for it to exit.
///
/// A tool that cannot be spawned is [`Error::CommandFailed`]; a tool that
/// exits unsuccessfully is [`Error::DiskImage`] carrying its exit code and
/// stderr verbatim.
pub async fn run_tool<I, S>(program: &str, args: I, operation: &str) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    log::debug!("Running {:?}", cmd.as_std());

    let output = cmd.output().await.map_err(|error| Error::CommandFailed {
        command: program.to_string(),
        error,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        return Err(Error::DiskImage {
            operation: operation.to_string(),
            code: output.status.code(),
            stderr,
        });
    }

    Ok(output)
}
