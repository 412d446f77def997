//! Command line interface for the packaging and install binaries.

mod args;
pub mod commands;
mod output;

pub use args::{BundleArgs, InstallArgs, RuntimeConfig};
pub use commands::{execute_install, execute_package, report_failure};
pub use output::OutputManager;

use clap::Parser;

/// Entry point of `cpu_limiter_bundler`. Returns the process exit code.
pub async fn run_bundle() -> i32 {
    let _args = BundleArgs::parse();
    let config = RuntimeConfig::new();
    match execute_package(&config).await {
        Ok(code) => code,
        Err(e) => report_failure(&config, &e),
    }
}

/// Entry point of `cpu_limiter_install`. Returns the process exit code.
pub async fn run_install() -> i32 {
    let args = InstallArgs::parse();
    let config = RuntimeConfig::new();
    match execute_install(&args, &config).await {
        Ok(code) => code,
        Err(e) => report_failure(&config, &e),
    }
}
