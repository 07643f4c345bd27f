//! Structured logging setup for host applications.

use gunshot_core::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::error::StreamError;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `config.level` is the filter.
/// With `config.json` the output is one JSON object per line.
///
/// # Errors
///
/// Returns [`StreamError::Telemetry`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), StreamError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            StreamError::Telemetry(format!("invalid log filter {:?}: {e}", config.level))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| StreamError::Telemetry(e.to_string()))
}
