//! Lifecycle hooks around the application run
//!
//! - Before the pipeline: optionally start the telemetry agent service
//!   (`STACKDRIVER_AGENT=true`). Never fatal.
//! - After the start step: optionally delete the hosting instance
//!   (`AUTODESTROY=true`). Fatal on failure.

use crate::config::BootstrapConfig;
use crate::errors::{MetadataError, Result};
use crate::metadata::{keys, MetadataMap};
use crate::process::{run_checked, CommandRunner, CommandSpec};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Outcome of [`maybe_start_telemetry_agent`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum TelemetryOutcome {
    Disabled,
    Started,
    Failed(String),
}

/// Start the telemetry agent if `STACKDRIVER_AGENT` is `"true"`
#[instrument(skip_all)]
pub async fn maybe_start_telemetry_agent<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> TelemetryOutcome {
    if !metadata.flag_enabled(keys::STACKDRIVER_AGENT) {
        return TelemetryOutcome::Disabled;
    }

    info!("Starting telemetry agent {}", config.telemetry_service);
    let spec = CommandSpec::new("service")
        .arg(config.telemetry_service.clone())
        .arg("start");
    match run_checked(runner, &spec).await {
        Ok(_) => TelemetryOutcome::Started,
        Err(e) => {
            warn!(
                "{} not installed or failed to start, skipping: {}",
                config.telemetry_service, e
            );
            TelemetryOutcome::Failed(e.to_string())
        }
    }
}

/// Build the instance deletion command
pub fn delete_instance_command(
    config: &BootstrapConfig,
    name: &str,
    zone: &str,
) -> CommandSpec {
    CommandSpec::new(config.gcloud_path.clone())
        .args(["compute", "instances", "delete"])
        .arg(name)
        .arg("--zone")
        .arg(zone)
        .arg("-q")
        .current_dir(&config.home_dir)
}

/// Delete the current instance if `AUTODESTROY` is `"true"`
///
/// Returns whether the deletion was issued. The delete runs without
/// confirmation; on success the host is going away.
#[instrument(skip_all)]
pub async fn maybe_self_destruct<R: CommandRunner>(
    runner: &R,
    config: &BootstrapConfig,
    metadata: &MetadataMap,
) -> Result<bool> {
    if !metadata.flag_enabled(keys::AUTODESTROY) {
        return Ok(false);
    }

    let required = |key: &str| {
        metadata
            .get_set(key)
            .ok_or_else(|| MetadataError::MissingKey {
                key: key.to_string(),
            })
    };
    let name = required(keys::NAME)?;
    let zone = required(keys::ZONE)?;

    warn!("Deleting virtual machine {} in zone {}", name, zone);
    let spec = delete_instance_command(config, &name, &zone);
    run_checked(runner, &spec).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppbootError;
    use crate::process::mock::MockRunner;
    use serde_json::{json, Value};
    use std::path::PathBuf;

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            home_dir: PathBuf::from("/srv"),
            ..Default::default()
        }
    }

    fn metadata_with(key: &str, value: Option<Value>) -> MetadataMap {
        let mut metadata: MetadataMap = [("NAME", json!("vm-7")), ("ZONE", json!("us-east1-b"))]
            .into_iter()
            .collect();
        if let Some(value) = value {
            metadata.insert(key, value);
        }
        metadata
    }

    #[tokio::test]
    async fn test_self_destruct_only_for_exact_true() {
        let cases = [
            (Some(json!("true")), true),
            (Some(json!(true)), true),
            (Some(json!("false")), false),
            (Some(json!("1")), false),
            (Some(json!("True")), false),
            (Some(json!({"on": true})), false),
            (Some(json!(["true"])), false),
            (Some(Value::Null), false),
            (None, false),
        ];

        for (value, expected) in cases {
            let runner = MockRunner::new();
            let metadata = metadata_with("AUTODESTROY", value.clone());
            let issued = maybe_self_destruct(&runner, &config(), &metadata)
                .await
                .unwrap();
            assert_eq!(issued, expected, "AUTODESTROY={:?}", value);
            assert_eq!(runner.history().len(), usize::from(expected));
        }
    }

    #[tokio::test]
    async fn test_self_destruct_command_shape() {
        let runner = MockRunner::new();
        let metadata = metadata_with("AUTODESTROY", Some(json!("true")));
        maybe_self_destruct(&runner, &config(), &metadata)
            .await
            .unwrap();

        let calls = runner.history();
        assert_eq!(
            calls[0].argv(),
            vec![
                "gcloud",
                "compute",
                "instances",
                "delete",
                "vm-7",
                "--zone",
                "us-east1-b",
                "-q"
            ]
        );
        assert_eq!(calls[0].cwd, Some(PathBuf::from("/srv")));
    }

    #[tokio::test]
    async fn test_self_destruct_failure_is_fatal() {
        let runner = MockRunner::new();
        runner.fail("gcloud", 1);
        let metadata = metadata_with("AUTODESTROY", Some(json!("true")));
        assert!(maybe_self_destruct(&runner, &config(), &metadata)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_self_destruct_requires_name() {
        let runner = MockRunner::new();
        let metadata: MetadataMap = [("AUTODESTROY", json!("true")), ("ZONE", json!("z"))]
            .into_iter()
            .collect();
        let err = maybe_self_destruct(&runner, &config(), &metadata)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppbootError::Metadata(MetadataError::MissingKey { .. })
        ));
        assert!(runner.history().is_empty());
    }

    #[tokio::test]
    async fn test_telemetry_disabled_by_default() {
        let runner = MockRunner::new();
        let outcome = maybe_start_telemetry_agent(&runner, &config(), &MetadataMap::new()).await;
        assert_eq!(outcome, TelemetryOutcome::Disabled);
        assert!(runner.history().is_empty());
    }

    #[tokio::test]
    async fn test_telemetry_started() {
        let runner = MockRunner::new();
        let metadata = metadata_with("STACKDRIVER_AGENT", Some(json!("true")));
        let outcome = maybe_start_telemetry_agent(&runner, &config(), &metadata).await;
        assert_eq!(outcome, TelemetryOutcome::Started);
        assert_eq!(
            runner.history()[0].argv(),
            vec!["service", "stackdriver-agent", "start"]
        );
    }

    #[tokio::test]
    async fn test_telemetry_failure_tolerated() {
        let runner = MockRunner::new();
        runner.missing("service");
        let metadata = metadata_with("STACKDRIVER_AGENT", Some(json!("true")));
        let outcome = maybe_start_telemetry_agent(&runner, &config(), &metadata).await;
        assert!(matches!(outcome, TelemetryOutcome::Failed(_)));

        let runner = MockRunner::new();
        runner.fail("service", 5);
        let outcome = maybe_start_telemetry_agent(&runner, &config(), &metadata).await;
        assert!(matches!(outcome, TelemetryOutcome::Failed(_)));
    }
}
