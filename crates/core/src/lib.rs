//! Core library for the appboot VM bootstrapper
//!
//! This crate contains the metadata client, workspace preparation, repository
//! checkout, env file generation, application driver, lifecycle hooks and the
//! pipeline that ties them together, along with logging and error handling.

pub mod app;
pub mod config;
pub mod envfile;
pub mod errors;
pub mod hooks;
pub mod logging;
pub mod metadata;
pub mod pipeline;
pub mod process;
pub mod repository;
pub mod workspace;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
