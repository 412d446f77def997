//! `cpu_limiter_install`: installs CPU Limiter from a finished DMG.

use cpu_limiter_bundler::cli;
use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    process::exit(cli::run_install().await);
}
