//! Command execution for the two binaries.

mod install;
mod package;

pub use install::execute_install;
pub use package::execute_package;

use crate::cli::RuntimeConfig;
use crate::error::PackagerError;

/// Prints a fatal error, the failing tool's own stderr and recovery hints.
///
/// Returns the exit code the process should end with.
pub fn report_failure(config: &RuntimeConfig, error: &PackagerError) -> i32 {
    let output = config.output();
    match error.tool_stderr() {
        // the tool's message is printed as-is, without our prefix
        Some(stderr) if !stderr.is_empty() => {
            config.error_println(&format!(
                "Fatal error: external tool failed (exit code {})",
                error.exit_code()
            ));
            eprintln!("{stderr}");
        }
        _ => config.error_println(&format!("Fatal error: {error}")),
    }

    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() {
        let _ = output.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            let _ = output.indent(&format!("• {suggestion}"));
        }
    }

    error.exit_code()
}
