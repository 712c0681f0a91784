//! Working directory preparation
//!
//! The working directory is wiped and recreated at the start of every run.
//! Both steps are best-effort: a busy mount may refuse deletion. Failures are
//! reported as [`BestEffort::Failed`] and never abort the run.
//! [`check_working_dir`] is the fatal guard run before anything else, so a
//! host whose working directory was never provisioned stops untouched.

use crate::config::BootstrapConfig;
use crate::errors::{FilesystemError, Result};
use crate::process::{CommandRunner, CommandSpec};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Outcome of a step whose failure is tolerated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum BestEffort {
    Done,
    Failed(String),
}

impl BestEffort {
    pub fn is_done(&self) -> bool {
        matches!(self, BestEffort::Done)
    }
}

/// Result of [`reset`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResetOutcome {
    pub removed: BestEffort,
    pub created: BestEffort,
}

impl ResetOutcome {
    pub fn is_clean(&self) -> bool {
        self.removed.is_done() && self.created.is_done()
    }
}

/// Run a command, folding every failure into a [`BestEffort`]
async fn best_effort<R: CommandRunner>(runner: &R, spec: &CommandSpec) -> BestEffort {
    match runner.run(spec).await {
        Ok(result) if result.success => BestEffort::Done,
        Ok(result) => {
            let stderr = result.stderr.trim();
            let reason = if stderr.is_empty() {
                format!("exit code {}", result.exit_code)
            } else {
                format!("exit code {}: {}", result.exit_code, stderr)
            };
            warn!("`{}` failed ({}), continuing", spec.command_line(), reason);
            BestEffort::Failed(reason)
        }
        Err(e) => {
            warn!("`{}` failed ({}), continuing", spec.command_line(), e);
            BestEffort::Failed(e.to_string())
        }
    }
}

/// Delete and recreate the working directory
#[instrument(skip_all, fields(working_dir = %config.working_dir.display()))]
pub async fn reset<R: CommandRunner>(runner: &R, config: &BootstrapConfig) -> ResetOutcome {
    info!("Resetting working directory {}", config.working_dir.display());
    let target = config.working_dir.to_string_lossy().to_string();

    let remove = CommandSpec::new("rm")
        .args(["-R", "-f"])
        .arg(target.clone())
        .current_dir(&config.home_dir)
        .capture();
    let removed = best_effort(runner, &remove).await;

    let create = CommandSpec::new("mkdir")
        .arg("-p")
        .arg(target)
        .current_dir(&config.home_dir)
        .capture();
    let created = best_effort(runner, &create).await;

    ResetOutcome { removed, created }
}

/// Fail unless the working directory exists and can be listed
pub fn check_working_dir(path: &Path) -> Result<()> {
    match std::fs::read_dir(path) {
        Ok(_) => {
            debug!("Working directory {} is ready", path.display());
            Ok(())
        }
        Err(e) => {
            debug!("Cannot read {}: {}", path.display(), e);
            Err(FilesystemError::MissingWorkingDir {
                path: path.display().to_string(),
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppbootError;
    use crate::process::mock::{MockResponse, MockRunner};
    use crate::process::HostRunner;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> BootstrapConfig {
        BootstrapConfig {
            working_dir: temp.path().join("app"),
            home_dir: temp.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_reset_issues_rm_then_mkdir_from_home() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let runner = MockRunner::new();

        let outcome = reset(&runner, &config).await;
        assert!(outcome.is_clean());

        let target = config.working_dir.to_string_lossy().to_string();
        let argvs: Vec<Vec<String>> = runner.history().iter().map(|c| c.argv()).collect();
        assert_eq!(
            argvs,
            vec![
                vec!["rm".to_string(), "-R".to_string(), "-f".to_string(), target.clone()],
                vec!["mkdir".to_string(), "-p".to_string(), target],
            ]
        );
        for call in runner.history() {
            assert_eq!(call.cwd.as_deref(), Some(temp.path()));
        }
    }

    #[tokio::test]
    async fn test_reset_swallows_failures() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        runner.respond(
            "rm",
            MockResponse::Exit {
                code: 1,
                stdout: String::new(),
                stderr: "Device or resource busy\n".to_string(),
            },
        );
        runner.missing("mkdir");

        let outcome = reset(&runner, &config_in(&temp)).await;
        assert_eq!(
            outcome.removed,
            BestEffort::Failed("exit code 1: Device or resource busy".to_string())
        );
        assert!(matches!(outcome.created, BestEffort::Failed(_)));
        assert_eq!(runner.history().len(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reset_on_host_clears_previous_content() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        std::fs::create_dir_all(config.working_dir.join("old")).unwrap();
        std::fs::write(config.working_dir.join("old/file.txt"), "stale").unwrap();

        let outcome = reset(&HostRunner::new(), &config).await;
        assert!(outcome.is_clean());
        assert!(config.working_dir.is_dir());
        assert_eq!(std::fs::read_dir(&config.working_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_check_working_dir() {
        let temp = TempDir::new().unwrap();
        assert!(check_working_dir(temp.path()).is_ok());

        let missing = temp.path().join("missing");
        let err = check_working_dir(&missing).unwrap_err();
        assert!(matches!(
            err,
            AppbootError::Filesystem(FilesystemError::MissingWorkingDir { .. })
        ));
        assert!(err.to_string().contains("folder does not exist"));
    }
}
