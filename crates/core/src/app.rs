//! Dependency install, build and start
//!
//! Each step runs its configured command in the application directory
//! (`{working_dir}/{APP_ROOT}`) with output streamed to the console. A
//! non-zero exit is fatal for all three; the default build command passes
//! `--if-present` so projects without a build script build as a no-op.

use crate::config::BootstrapConfig;
use crate::envfile::app_dir;
use crate::errors::{ConfigError, Result};
use crate::metadata::{keys, MetadataMap};
use crate::process::{run_checked, CommandRunner, CommandSpec};
use serde::Serialize;
use tracing::{info, instrument};

/// Outcome of [`start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOutcome {
    Started,
    Skipped,
}

async fn run_in_app_dir<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
    argv: Vec<String>,
) -> Result<()> {
    let cwd = app_dir(config, metadata);
    let spec = CommandSpec::from_argv(&argv)
        .ok_or_else(|| ConfigError::Validation {
            message: "command must not be empty".to_string(),
        })?
        .current_dir(&cwd);
    info!("Running `{}` in {}", spec.command_line(), cwd.display());
    run_checked(runner, &spec).await?;
    Ok(())
}

/// Install the application's dependencies
#[instrument(skip_all)]
pub async fn install<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> Result<()> {
    info!("Installing dependencies");
    run_in_app_dir(runner, config, metadata, config.install_args()?).await
}

/// Build the application
#[instrument(skip_all)]
pub async fn build<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> Result<()> {
    info!("Building application");
    run_in_app_dir(runner, config, metadata, config.build_args()?).await
}

/// Start the application unless `SKIP_START` is the string `"true"`
///
/// The start command usually runs for the lifetime of the application, so
/// this returns only once the application exits.
#[instrument(skip_all)]
pub async fn start<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> Result<StartOutcome> {
    if metadata.is_string_true(keys::SKIP_START) {
        info!("SKIP_START is set, not starting the application");
        return Ok(StartOutcome::Skipped);
    }
    info!("Starting application");
    run_in_app_dir(runner, config, metadata, config.start_args()?).await?;
    Ok(StartOutcome::Started)
}
