//! Logging and observability
//!
//! Structured logging via `tracing-subscriber`, in either human-readable text
//! or JSON, selected at runtime. All log output goes to stderr so that stdout
//! stays free for machine-readable command output (`appboot metadata`,
//! `--summary json`).

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Initialize the logging system with an optional format specification
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// ## Arguments
///
/// * `format` - `None` or `"text"` for text output, `"json"` for JSON lines.
///
/// ## Environment Variables
///
/// * `APPBOOT_LOG_FORMAT` - Used when `format` is `None` ("json" for JSON)
/// * `APPBOOT_LOG` - Filter directive, takes precedence over `RUST_LOG`
/// * `RUST_LOG` - Standard fallback filter; default is `info`
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var("APPBOOT_LOG_FORMAT").ok();
        let effective_format = format.or(env_format.as_deref()).unwrap_or("text");

        match effective_format {
            "json" => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(fmt::layer().with_target(false).with_writer(io::stderr))
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {}", effective_format);
    });

    Ok(())
}

/// Create an EnvFilter based on environment variables
fn create_env_filter() -> EnvFilter {
    if let Ok(spec) = std::env::var("APPBOOT_LOG") {
        EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!("Invalid APPBOOT_LOG specification '{}', using 'info'", spec);
            EnvFilter::new("info")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
