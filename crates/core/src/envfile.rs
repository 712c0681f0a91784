//! `.env` file generation
//!
//! Writes every metadata entry, except the deployment-only keys, as a
//! `KEY=VALUE` line into `{working_dir}/{APP_ROOT}/.env`. The file is rewritten
//! from scratch on every run.

use crate::config::BootstrapConfig;
use crate::errors::{FilesystemError, Result};
use crate::metadata::{keys, value_to_text, MetadataMap};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Keys that never reach the env file
pub const EXCLUDED_KEYS: &[&str] = &[keys::GIT_URL, keys::ZONE, keys::NAME];

/// Directory the application lives in: working dir joined with `APP_ROOT`
///
/// `APP_ROOT` is always relative to the working dir; a leading `/` does not
/// make it absolute.
pub fn app_dir(config: &BootstrapConfig, metadata: &MetadataMap) -> PathBuf {
    let mut dir = config.working_dir.clone();
    if let Some(root) = metadata.get_set(keys::APP_ROOT) {
        dir.extend(
            Path::new(&root)
                .components()
                .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_))),
        );
    }
    dir
}

/// Path of the generated env file
pub fn env_file_path(config: &BootstrapConfig, metadata: &MetadataMap) -> PathBuf {
    app_dir(config, metadata).join(".env")
}

/// Render the env file content in map order
pub fn render(metadata: &MetadataMap) -> String {
    metadata
        .iter()
        .filter(|(key, _)| !EXCLUDED_KEYS.contains(&key.as_str()))
        .map(|(key, value)| format!("{}={}\n", key, value_to_text(value)))
        .collect()
}

/// Truncate and write the env file, returning its path
#[instrument(skip_all)]
pub fn write_env_file(config: &BootstrapConfig, metadata: &MetadataMap) -> Result<PathBuf> {
    let path = env_file_path(config, metadata);
    info!("Writing env file at {}", path.display());

    let content = render(metadata);
    write_truncated(&path, &content).map_err(|source| FilesystemError::EnvFile {
        path: path.display().to_string(),
        source,
    })?;

    debug!("Wrote {} env entries", content.lines().count());
    Ok(path)
}

fn write_truncated(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;
    file.flush()
}
