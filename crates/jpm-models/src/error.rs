//! Model error types.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or classifying raw lifecycle events.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Unrecognized event type: {0}")]
    UnrecognizedEventType(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid timecode: {0}")]
    InvalidTimecode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }

    pub fn unrecognized(detail_type: impl Into<String>) -> Self {
        Self::UnrecognizedEventType(detail_type.into())
    }

    pub fn invalid_timestamp(msg: impl Into<String>) -> Self {
        Self::InvalidTimestamp(msg.into())
    }

    pub fn invalid_timecode(msg: impl Into<String>) -> Self {
        Self::InvalidTimecode(msg.into())
    }
}
