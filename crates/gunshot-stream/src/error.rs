//! Error types for the stream layer.
//!
//! Transport failures are recoverable and mostly end up as log lines and
//! state transitions rather than returned errors. Only setup (config,
//! logging) and calls into a stopped engine surface a [`StreamError`].

use gunshot_core::config::ConfigError;

/// Errors that can occur while connecting, pulling, or driving the engine.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The streaming handshake failed.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// An established connection failed while reading.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend closed the connection.
    #[error("connection closed: {0}")]
    Closed(String),

    /// An HTTP pull failed or returned an unusable body.
    #[error("HTTP pull error: {0}")]
    Http(String),

    /// The engine task is no longer running.
    #[error("engine stopped")]
    EngineStopped,

    /// The tracing subscriber could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Configuration is invalid.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}
