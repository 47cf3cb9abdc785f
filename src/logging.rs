//! Tracing subscriber setup
//!
//! A registry with an [`EnvFilter`] and one fmt layer, text or JSON.
//! `RUST_LOG` takes precedence over the level passed on the command line.
//! Logs go to stderr so stdout only carries the run summary.
//!
//! ```text
//! Registry
//!   ├── EnvFilter (RUST_LOG, else --log-level)
//!   └── Fmt Layer (text | json, stderr)
//! ```

use clap::ValueEnum;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Logging setup errors
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, String),

    #[error("Failed to set global subscriber (may already be initialized): {0}")]
    AlreadyInitialized(String),
}

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Build the filter: `RUST_LOG` if set, otherwise `level`
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| LoggingError::InvalidFilter(level.to_string(), e.to_string())),
    }
}

/// Install the global subscriber
pub fn init_subscriber(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let env_filter = env_filter(level)?;

    let result = match format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true);
            tracing::subscriber::set_global_default(
                tracing_subscriber::registry().with(env_filter).with(fmt_layer),
            )
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_target(true);
            tracing::subscriber::set_global_default(
                tracing_subscriber::registry().with(env_filter).with(fmt_layer),
            )
        }
    };

    result.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
