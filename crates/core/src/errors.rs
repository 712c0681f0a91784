//! Error types and handling
//!
//! The error taxonomy is split into one enum per concern (metadata, git,
//! filesystem, process execution, configuration). All of them are wrapped in
//! the top-level [`AppbootError`] so the pipeline can propagate any fatal
//! failure with `?`.
//!
//! Best-effort failures (workspace reset, telemetry agent start) never become
//! errors; see [`crate::workspace::BestEffort`] and
//! [`crate::hooks::TelemetryOutcome`].

use thiserror::Error;

/// Metadata server errors
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Transport-level failure talking to the metadata server
    #[error("Metadata request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The response did not have the expected shape
    #[error("Malformed metadata response for {path}: {message}")]
    Malformed { path: String, message: String },

    /// A key needed by a step is absent from the metadata map
    #[error("Metadata key {key} is required")]
    MissingKey { key: String },
}

/// Git-related errors
#[derive(Error, Debug)]
pub enum GitError {
    /// GIT_URL is absent or empty
    #[error("GIT_URL required")]
    MissingUrl,

    /// Repository clone failed
    #[error("Failed to clone repository: {0}")]
    CloneFailed(String),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Working directory is missing after reset
    #[error("{path} folder does not exist")]
    MissingWorkingDir { path: String },

    /// Env file could not be written
    #[error("Failed to write env file {path}: {source}")]
    EnvFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// External command errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be started at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully
    #[error("Command `{command}` failed with exit code {code}")]
    ExitStatus { command: String, code: i32 },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file {path}: {message}")]
    Parsing { path: String, message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum AppbootError {
    /// Metadata server errors
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Git errors
    #[error("Git error: {0}")]
    Git(#[from] GitError),

    /// Filesystem errors
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// External command errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience type alias for Results with AppbootError
pub type Result<T> = std::result::Result<T, AppbootError>;
