//! Bootstrap pipeline
//!
//! Runs the bootstrap phases strictly in order:
//!
//! `checkWorkingDir -> fetchMetadata -> startTelemetry -> prepareWorkspace
//! -> clone -> writeEnv -> install -> build -> start -> autoDestroy`
//!
//! Every phase is recorded in a [`RunSummary`]. The first fatal error marks
//! its phase failed and stops the run; side effects of earlier phases (a
//! partial clone, a written env file) are left in place. Telemetry start and
//! the workspace reset are best-effort and show up as `degraded` instead of
//! aborting.

use crate::app::{self, StartOutcome};
use crate::config::BootstrapConfig;
use crate::envfile;
use crate::errors::{AppbootError, Result};
use crate::hooks::{self, TelemetryOutcome};
use crate::metadata::{self, MetadataClient, MetadataMap};
use crate::process::CommandRunner;
use crate::repository;
use crate::workspace::{self, BestEffort};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, instrument};

/// Bootstrap phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BootstrapPhase {
    CheckWorkingDir,
    FetchMetadata,
    StartTelemetry,
    PrepareWorkspace,
    Clone,
    WriteEnv,
    Install,
    Build,
    Start,
    AutoDestroy,
}

impl BootstrapPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapPhase::CheckWorkingDir => "checkWorkingDir",
            BootstrapPhase::FetchMetadata => "fetchMetadata",
            BootstrapPhase::StartTelemetry => "startTelemetry",
            BootstrapPhase::PrepareWorkspace => "prepareWorkspace",
            BootstrapPhase::Clone => "clone",
            BootstrapPhase::WriteEnv => "writeEnv",
            BootstrapPhase::Install => "install",
            BootstrapPhase::Build => "build",
            BootstrapPhase::Start => "start",
            BootstrapPhase::AutoDestroy => "autoDestroy",
        }
    }

    /// All phases in the order they run
    pub fn execution_order() -> &'static [BootstrapPhase] {
        &[
            BootstrapPhase::CheckWorkingDir,
            BootstrapPhase::FetchMetadata,
            BootstrapPhase::StartTelemetry,
            BootstrapPhase::PrepareWorkspace,
            BootstrapPhase::Clone,
            BootstrapPhase::WriteEnv,
            BootstrapPhase::Install,
            BootstrapPhase::Build,
            BootstrapPhase::Start,
            BootstrapPhase::AutoDestroy,
        ]
    }
}

/// Status of a phase after the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Executed,
    Skipped,
    /// Best-effort phase that failed without aborting the run
    Degraded,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Executed => "executed",
            PhaseStatus::Skipped => "skipped",
            PhaseStatus::Degraded => "degraded",
            PhaseStatus::Failed => "failed",
        }
    }
}

/// Recorded state of one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseState {
    pub phase: BootstrapPhase,
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl PhaseState {
    fn new(phase: BootstrapPhase, status: PhaseStatus, reason: Option<String>) -> Self {
        Self {
            phase,
            status,
            reason,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn executed(phase: BootstrapPhase) -> Self {
        Self::new(phase, PhaseStatus::Executed, None)
    }

    pub fn skipped(phase: BootstrapPhase, reason: impl Into<String>) -> Self {
        Self::new(phase, PhaseStatus::Skipped, Some(reason.into()))
    }

    pub fn degraded(phase: BootstrapPhase, reason: impl Into<String>) -> Self {
        Self::new(phase, PhaseStatus::Degraded, Some(reason.into()))
    }

    pub fn failed(phase: BootstrapPhase, reason: impl Into<String>) -> Self {
        Self::new(phase, PhaseStatus::Failed, Some(reason.into()))
    }
}

/// Summary of a bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub phases: Vec<PhaseState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,
    pub instance_deleted: bool,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_phase(&mut self, state: PhaseState) {
        self.phases.push(state);
    }

    pub fn status_of(&self, phase: BootstrapPhase) -> Option<PhaseStatus> {
        self.phases
            .iter()
            .find(|p| p.phase == phase)
            .map(|p| p.status)
    }

    pub fn with_status(&self, status: PhaseStatus) -> Vec<&PhaseState> {
        self.phases.iter().filter(|p| p.status == status).collect()
    }

    /// True when no phase failed (degraded phases are allowed)
    pub fn succeeded(&self) -> bool {
        !self.phases.iter().any(|p| p.status == PhaseStatus::Failed)
    }

    /// Record the outcome of a fatal phase, passing the result through
    fn record<T>(&mut self, phase: BootstrapPhase, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.add_phase(PhaseState::executed(phase));
                Ok(value)
            }
            Err(e) => Err(self.fail(phase, e)),
        }
    }

    /// Record a fatal error for `phase` and hand it back
    fn fail(&mut self, phase: BootstrapPhase, e: AppbootError) -> AppbootError {
        error!("Phase {} failed: {}", phase.as_str(), e);
        self.add_phase(PhaseState::failed(phase, e.to_string()));
        e
    }
}

/// Drives a full bootstrap run
#[derive(Debug)]
pub struct Bootstrapper<R, M> {
    config: BootstrapConfig,
    runner: R,
    client: M,
}

impl<R: CommandRunner, M: MetadataClient> Bootstrapper<R, M> {
    pub fn new(config: BootstrapConfig, runner: R, client: M) -> Self {
        Self {
            config,
            runner,
            client,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Run every phase and return the summary, or the first fatal error
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        self.execute(&mut summary).await?;
        Ok(summary)
    }

    /// Run every phase, recording into a caller-owned summary
    ///
    /// On error the summary holds every phase up to and including the one
    /// that failed.
    #[instrument(skip_all)]
    pub async fn execute(&self, summary: &mut RunSummary) -> Result<()> {
        let config = &self.config;
        let runner = &self.runner;

        // The working directory must exist before anything is fetched.
        if config.verify_working_dir {
            summary.record(
                BootstrapPhase::CheckWorkingDir,
                workspace::check_working_dir(&config.working_dir),
            )?;
        } else {
            summary.add_phase(PhaseState::skipped(
                BootstrapPhase::CheckWorkingDir,
                "working directory check disabled",
            ));
        }

        let metadata: MetadataMap = summary.record(
            BootstrapPhase::FetchMetadata,
            metadata::collect(&self.client).await,
        )?;

        let telemetry = match hooks::maybe_start_telemetry_agent(runner, config, &metadata).await
        {
            TelemetryOutcome::Disabled => PhaseState::skipped(
                BootstrapPhase::StartTelemetry,
                "telemetry agent not requested",
            ),
            TelemetryOutcome::Started => PhaseState::executed(BootstrapPhase::StartTelemetry),
            TelemetryOutcome::Failed(reason) => {
                PhaseState::degraded(BootstrapPhase::StartTelemetry, reason)
            }
        };
        summary.add_phase(telemetry);

        let reset = workspace::reset(runner, config).await;
        if reset.is_clean() {
            summary.add_phase(PhaseState::executed(BootstrapPhase::PrepareWorkspace));
        } else {
            let reasons: Vec<String> = [reset.removed, reset.created]
                .into_iter()
                .filter_map(|outcome| match outcome {
                    BestEffort::Failed(reason) => Some(reason),
                    BestEffort::Done => None,
                })
                .collect();
            summary.add_phase(PhaseState::degraded(
                BootstrapPhase::PrepareWorkspace,
                reasons.join("; "),
            ));
        }

        summary.record(
            BootstrapPhase::Clone,
            repository::clone_repository(runner, config, &metadata).await,
        )?;

        let env_file = summary.record(
            BootstrapPhase::WriteEnv,
            envfile::write_env_file(config, &metadata),
        )?;
        summary.env_file = Some(env_file);

        summary.record(
            BootstrapPhase::Install,
            app::install(runner, config, &metadata).await,
        )?;
        summary.record(
            BootstrapPhase::Build,
            app::build(runner, config, &metadata).await,
        )?;

        match app::start(runner, config, &metadata).await {
            Ok(StartOutcome::Started) => {
                summary.add_phase(PhaseState::executed(BootstrapPhase::Start))
            }
            Ok(StartOutcome::Skipped) => summary.add_phase(PhaseState::skipped(
                BootstrapPhase::Start,
                "SKIP_START=true",
            )),
            Err(e) => return Err(summary.fail(BootstrapPhase::Start, e)),
        }

        match hooks::maybe_self_destruct(runner, config, &metadata).await {
            Ok(true) => {
                summary.add_phase(PhaseState::executed(BootstrapPhase::AutoDestroy));
                summary.instance_deleted = true;
            }
            Ok(false) => summary.add_phase(PhaseState::skipped(
                BootstrapPhase::AutoDestroy,
                "AUTODESTROY not set",
            )),
            Err(e) => return Err(summary.fail(BootstrapPhase::AutoDestroy, e)),
        }

        info!("Bootstrap completed");
        Ok(())
    }
}
