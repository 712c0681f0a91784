//! Application repository checkout
//!
//! Clones a single branch of `GIT_URL` into the working directory. The clone
//! streams git's progress to the console and runs from the home directory.

use crate::config::BootstrapConfig;
use crate::errors::{GitError, Result};
use crate::metadata::{keys, MetadataMap};
use crate::process::{CommandRunner, CommandSpec};
use tracing::{info, instrument};

/// Repository and branch resolved from metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneTarget {
    pub url: String,
    pub branch: String,
}

/// Resolve `GIT_URL` and `GIT_BRANCH`, defaulting the branch
pub fn resolve_target(config: &BootstrapConfig, metadata: &MetadataMap) -> Result<CloneTarget> {
    let url = metadata.get_set(keys::GIT_URL).ok_or(GitError::MissingUrl)?;
    let branch = metadata
        .get_set(keys::GIT_BRANCH)
        .unwrap_or_else(|| config.default_branch.clone());
    Ok(CloneTarget { url, branch })
}

/// Build the `git clone` invocation for a target
pub fn clone_command(config: &BootstrapConfig, target: &CloneTarget) -> CommandSpec {
    let mut spec = CommandSpec::new(config.git_path.clone())
        .args(["clone", "--single-branch", "--branch"])
        .arg(target.branch.clone());
    if let Some(depth) = config.clone_depth {
        spec = spec.arg("--depth").arg(depth.to_string());
    }
    spec.arg(target.url.clone())
        .arg(config.working_dir.to_string_lossy().to_string())
        .current_dir(&config.home_dir)
}

/// Clone the application repository into the working directory
///
/// Fails with [`GitError::MissingUrl`] before running anything when
/// `GIT_URL` is unset, and with [`GitError::CloneFailed`] when git cannot be
/// started or exits non-zero.
#[instrument(skip_all)]
pub async fn clone_repository<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> Result<CloneTarget> {
    let target = resolve_target(config, metadata)?;
    info!(
        "Cloning repository {} on branch {} at {}",
        target.url,
        target.branch,
        config.working_dir.display()
    );

    let spec = clone_command(config, &target);
    let result = runner
        .run(&spec)
        .await
        .map_err(|e| GitError::CloneFailed(e.to_string()))?;

    if !result.success {
        return Err(GitError::CloneFailed(format!(
            "`{}` exited with code {}",
            spec.command_line(),
            result.exit_code
        ))
        .into());
    }

    info!("Repository cloned to {}", config.working_dir.display());
    Ok(target)
}
