//! Error types for media analysis.

use thiserror::Error;

use jpm_models::ModelError;
use jpm_storage::StorageError;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while analysing job inputs.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("mediainfo not found: {0}")]
    MediainfoNotFound(String),

    #[error("Probe failed: {message}")]
    ProbeFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Invalid probe output: {0}")]
    InvalidProbeOutput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid input settings: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create a probe failure error.
    pub fn probe_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn invalid_output(message: impl Into<String>) -> Self {
        Self::InvalidProbeOutput(message.into())
    }
}
