//! Bootstrap configuration
//!
//! Everything the bootstrap needs besides the instance metadata: filesystem
//! locations, the metadata endpoint, and the commands used to install, build
//! and start the application. Values come from built-in defaults, optionally
//! overlaid by a TOML file, then by CLI flags (applied by the binary).
//!
//! ```toml
//! working_dir = "/srv/app"
//! home_dir = "/srv"
//! default_branch = "master"
//! install_command = "npm ci"
//! ```

use crate::errors::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a TOML configuration file
pub const CONFIG_ENV_VAR: &str = "APPBOOT_CONFIG";

/// Default metadata endpoint prefix; request paths are appended to it
pub const DEFAULT_METADATA_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance";

/// Configuration for a bootstrap run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootstrapConfig {
    /// Directory the repository is cloned into
    pub working_dir: PathBuf,
    /// Directory used as cwd for rm/mkdir/git/gcloud
    pub home_dir: PathBuf,
    /// Metadata endpoint prefix
    pub metadata_url: String,
    /// Branch cloned when GIT_BRANCH is unset
    pub default_branch: String,
    /// Optional `--depth` for the clone
    pub clone_depth: Option<u32>,
    /// Fail when the working directory is missing after reset
    pub verify_working_dir: bool,
    pub install_command: String,
    pub build_command: String,
    pub start_command: String,
    /// Service name passed to `service <name> start`
    pub telemetry_service: String,
    pub git_path: String,
    pub gcloud_path: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("/home/node/app"),
            home_dir: PathBuf::from("/home/node"),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            default_branch: "main".to_string(),
            clone_depth: None,
            verify_working_dir: true,
            install_command: "npm install".to_string(),
            build_command: "npm run build --if-present".to_string(),
            start_command: "npm start".to_string(),
            telemetry_service: "stackdriver-agent".to_string(),
            git_path: "git".to_string(),
            gcloud_path: "gcloud".to_string(),
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from an explicit path, the `APPBOOT_CONFIG`
    /// environment variable, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content, path)
    }

    fn from_toml_str(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            ConfigError::Parsing {
                path: path.display().to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Check that every configured command splits into at least a program
    pub fn validate(&self) -> Result<()> {
        for (field, command) in [
            ("install_command", &self.install_command),
            ("build_command", &self.build_command),
            ("start_command", &self.start_command),
        ] {
            split_command(field, command)?;
        }
        if self.telemetry_service.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "telemetry_service must not be empty".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn install_args(&self) -> Result<Vec<String>> {
        split_command("install_command", &self.install_command)
    }

    pub fn build_args(&self) -> Result<Vec<String>> {
        split_command("build_command", &self.build_command)
    }

    pub fn start_args(&self) -> Result<Vec<String>> {
        split_command("start_command", &self.start_command)
    }
}

/// Split a configured command line into program and arguments
fn split_command(field: &str, command: &str) -> Result<Vec<String>> {
    let parts = shell_words::split(command).map_err(|e| ConfigError::Validation {
        message: format!("{} could not be parsed: {}", field, e),
    })?;
    if parts.is_empty() {
        return Err(ConfigError::Validation {
            message: format!("{} must not be empty", field),
        }
        .into());
    }
    Ok(parts)
}
