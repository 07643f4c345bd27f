//! Error types for decoding backend payloads.
//!
//! A decode failure always concerns a single message. Callers discard the
//! offending message and keep their state unchanged.

/// A backend payload could not be normalized into canonical records.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the record layout.
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A tagged message is missing its body.
    #[error("message is missing field `{0}`")]
    MissingField(&'static str),

    /// A tagged message carries a `type` this engine does not handle.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The payload matches none of the known message shapes.
    #[error("unrecognized message shape: {0}")]
    UnrecognizedShape(&'static str),
}

/// A window policy string is not one of the supported selector values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown window policy `{0}` (expected 2m, 1h, 24h, or <n>s)")]
pub struct PolicyParseError(pub String);
