//! Process-wide `tracing` setup.

use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// Builds the filter from `RUST_LOG`, falling back to the configured level.
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|source| LoggingError::Filter {
        directive: config.level.clone(),
        source,
    })
}

/// Installs the global subscriber and routes `log` macros through it.
///
/// Call once at startup. A second call fails with
/// [`LoggingError::AlreadyInstalled`].
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(config.json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!config.json).then(|| fmt::layer().with_writer(std::io::stderr)));

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}
