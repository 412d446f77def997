//! `cpu_limiter_bundler`: packages the CPU Limiter binary as a macOS .app and DMG.

use cpu_limiter_bundler::cli;
use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    process::exit(cli::run_bundle().await);
}
