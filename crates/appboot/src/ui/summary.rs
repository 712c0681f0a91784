//! Run summary rendering for the `run` command.
//!
//! Text mode prints one line per recorded phase in execution order; JSON mode
//! prints the summary as a single document. Both go to stdout, logs stay on
//! stderr.

use appboot_core::pipeline::{PhaseStatus, RunSummary};
use clap::ValueEnum;
use console::style;

/// Output format of the run summary
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum SummaryFormat {
    Text,
    Json,
}

/// Render the summary in the requested format
pub fn render_summary(summary: &RunSummary, format: SummaryFormat) -> String {
    match format {
        SummaryFormat::Json => render_json(summary),
        SummaryFormat::Text => render_text(summary),
    }
}

fn render_json(summary: &RunSummary) -> String {
    let mut json = serde_json::to_string_pretty(summary).unwrap_or_else(|_| "{}".to_string());
    json.push('\n');
    json
}

/// Output format:
/// ```text
/// Bootstrap Summary
///   [OK] fetchMetadata: executed
///   [--] startTelemetry: skipped (telemetry agent not requested)
///   ...
/// ```
fn render_text(summary: &RunSummary) -> String {
    let mut output = format!("{}\n", style("Bootstrap Summary").bold());

    for state in &summary.phases {
        let (icon, status) = match state.status {
            PhaseStatus::Executed => (style("[OK]").green(), style("executed").green()),
            PhaseStatus::Skipped => (style("[--]").yellow(), style("skipped").yellow()),
            PhaseStatus::Degraded => (style("[!!]").yellow(), style("degraded").yellow().bold()),
            PhaseStatus::Failed => (style("[X]").red(), style("FAILED").red().bold()),
        };
        let reason = match &state.reason {
            Some(reason) => format!(" ({})", style(reason).italic()),
            None => String::new(),
        };
        output.push_str(&format!(
            "  {} {}: {}{}\n",
            icon,
            state.phase.as_str(),
            status,
            reason
        ));
    }

    if let Some(path) = &summary.env_file {
        output.push_str(&format!("\nEnv file: {}\n", path.display()));
    }
    if summary.instance_deleted {
        output.push_str(&format!(
            "{}\n",
            style("Instance deletion issued").yellow()
        ));
    }

    let message = if summary.succeeded() {
        style("Bootstrap completed").green()
    } else {
        style("Bootstrap failed").red()
    };
    output.push_str(&format!("\n{}\n", message));
    output
}
