use crate::ui::summary::{render_summary, SummaryFormat};
use anyhow::{Context, Result};
use appboot_core::config::BootstrapConfig;
use appboot_core::metadata::{self, ReqwestMetadataClient};
use appboot_core::pipeline::{Bootstrapper, RunSummary};
use appboot_core::process::HostRunner;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "VM application bootstrapper",
    long_about = "VM application bootstrapper\n\nReads deployment parameters from the instance metadata server, checks out the application repository and runs it.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via APPBOOT_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Configuration file path (TOML, can be set via APPBOOT_CONFIG env var)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the full bootstrap sequence
    Run {
        /// Directory the repository is cloned into
        #[arg(long, value_name = "PATH")]
        working_dir: Option<PathBuf>,

        /// Directory used as cwd for workspace, git and gcloud commands
        #[arg(long, value_name = "PATH")]
        home_dir: Option<PathBuf>,

        /// Base URL of the instance metadata endpoint
        #[arg(long, value_name = "URL")]
        metadata_url: Option<String>,

        /// Branch cloned when GIT_BRANCH is not set
        #[arg(long, value_name = "BRANCH")]
        default_branch: Option<String>,

        /// Skip the working directory existence check that runs before anything else
        #[arg(long)]
        no_verify_working_dir: bool,

        /// Format of the run summary printed on stdout
        #[arg(long, value_enum, default_value = "text")]
        summary: SummaryFormat,
    },
    /// Print the collected instance metadata as JSON
    Metadata {
        /// Base URL of the instance metadata endpoint
        #[arg(long, value_name = "URL")]
        metadata_url: Option<String>,
    },
}

impl Cli {
    /// Initialize logging, load configuration and run the selected command
    pub async fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None,
        };
        let log_level = self.log_level.as_str();

        if std::env::var_os("APPBOOT_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("appboot={},appboot_core={}", log_level, log_level),
            );
        }
        appboot_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", log_level);

        let Some(command) = self.command else {
            println!("VM application bootstrapper");
            println!("Run 'appboot --help' to see available commands.");
            return Ok(());
        };

        let mut config = BootstrapConfig::load(self.config.as_deref())?;

        match command {
            Commands::Run {
                working_dir,
                home_dir,
                metadata_url,
                default_branch,
                no_verify_working_dir,
                summary,
            } => {
                if let Some(dir) = working_dir {
                    config.working_dir = dir;
                }
                if let Some(dir) = home_dir {
                    config.home_dir = dir;
                }
                if let Some(url) = metadata_url {
                    config.metadata_url = url;
                }
                if let Some(branch) = default_branch {
                    config.default_branch = branch;
                }
                if no_verify_working_dir {
                    config.verify_working_dir = false;
                }
                run_bootstrap(config, summary).await
            }
            Commands::Metadata { metadata_url } => {
                let url = metadata_url.unwrap_or(config.metadata_url);
                let client = ReqwestMetadataClient::new(url)?;
                let map = metadata::collect(&client).await?;
                let json = serde_json::to_string_pretty(&map)
                    .context("Failed to serialize metadata")?;
                println!("{}", json);
                Ok(())
            }
        }
    }
}

async fn run_bootstrap(config: BootstrapConfig, format: SummaryFormat) -> Result<()> {
    let client = ReqwestMetadataClient::new(config.metadata_url.clone())?;
    let bootstrapper = Bootstrapper::new(config, HostRunner::new(), client);

    let mut summary = RunSummary::new();
    let result = bootstrapper.execute(&mut summary).await;
    print!("{}", render_summary(&summary, format));
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_global_flags_default_values() {
        let cli = Cli::parse_from(["appboot"]);
        assert!(cli.log_format.is_none());
        assert!(matches!(cli.log_level, LogLevel::Info));
        assert!(cli.config.is_none());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from([
            "appboot",
            "--log-format",
            "json",
            "run",
            "--working-dir",
            "/srv/app",
            "--home-dir",
            "/srv",
            "--default-branch",
            "develop",
            "--no-verify-working-dir",
            "--summary",
            "json",
        ]);
        assert!(matches!(cli.log_format, Some(LogFormat::Json)));
        match cli.command {
            Some(Commands::Run {
                working_dir,
                home_dir,
                metadata_url,
                default_branch,
                no_verify_working_dir,
                summary,
            }) => {
                assert_eq!(working_dir, Some(PathBuf::from("/srv/app")));
                assert_eq!(home_dir, Some(PathBuf::from("/srv")));
                assert!(metadata_url.is_none());
                assert_eq!(default_branch.as_deref(), Some("develop"));
                assert!(no_verify_working_dir);
                assert_eq!(summary, SummaryFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["appboot", "metadata", "--log-level", "debug"]);
        assert!(matches!(cli.log_level, LogLevel::Debug));
        assert!(matches!(cli.command, Some(Commands::Metadata { .. })));
    }

    #[test]
    fn test_unknown_summary_format_rejected() {
        assert!(Cli::try_parse_from(["appboot", "run", "--summary", "yaml"]).is_err());
    }
}
