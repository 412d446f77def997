//! Packaging command: binary → .app → .dmg.

use crate::bundler::Bundler;
use crate::cli::RuntimeConfig;
use crate::config::PackagingConfig;
use crate::error::Result;

/// Runs the packaging pipeline with the loaded configuration.
pub async fn execute_package(config: &RuntimeConfig) -> Result<i32> {
    let packaging = PackagingConfig::load()?;
    let settings = packaging.into_settings()?;
    let output = config.output();

    output.section(&format!(
        "{} {}",
        settings.product_name(),
        settings.version_string()
    ))?;

    if settings.dmg().layout.is_none() {
        config.warning_println("Finder window layout disabled; the DMG opens with default view");
    }

    let bundler = Bundler::new(settings);
    let artifacts = bundler
        .bundle_with_progress(&mut |stage| {
            let _ = output.stage(stage);
        })
        .await?;

    for artifact in &artifacts {
        output.artifact(artifact)?;
    }

    Ok(0)
}
