//! Install command: copy the .app from a finished DMG into /Applications.

use crate::bundler::Hdiutil;
use crate::cli::{InstallArgs, RuntimeConfig};
use crate::error::{CliError, Result};
use crate::install::{APPLICATIONS_DIR, install_from_dmg};
use std::path::Path;

/// Installs from `args.dmg`.
pub async fn execute_install(args: &InstallArgs, config: &RuntimeConfig) -> Result<i32> {
    let output = config.output();
    let is_dmg = args
        .dmg
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dmg"));
    if !is_dmg {
        return Err(CliError::InvalidArguments {
            reason: format!("{} is not a .dmg file", args.dmg.display()),
        }
        .into());
    }

    output.println(&format!("Installing from {}", args.dmg.display()))?;

    let installed = install_from_dmg(&Hdiutil, &args.dmg, Path::new(APPLICATIONS_DIR)).await?;

    output.success(&format!("Installed {}", installed.display()))?;
    Ok(0)
}
