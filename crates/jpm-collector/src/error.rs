//! Collector error types.

use thiserror::Error;

use jpm_media::MediaError;
use jpm_models::ModelError;
use jpm_storage::StorageError;
use jpm_store::StoreError;

pub type CollectorResult<T> = Result<T, CollectorError>;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Event rejected: {0}")]
    Model(#[from] ModelError),

    #[error("Media analysis failed: {0}")]
    Media(MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<MediaError> for CollectorError {
    fn from(e: MediaError) -> Self {
        match e {
            // bad clip timecodes in the job settings are an event problem
            MediaError::Model(e) => Self::Model(e),
            other => Self::Media(other),
        }
    }
}

impl CollectorError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Rejections are logged and swallowed; everything else is raised.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Short label for rejection metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Model(ModelError::UnrecognizedEventType(_)) => "unrecognized",
            Self::Model(ModelError::InvalidTimestamp(_)) => "invalid_timestamp",
            Self::Model(ModelError::InvalidTimecode(_)) => "invalid_timecode",
            Self::Model(_) => "malformed",
            Self::Media(MediaError::ProbeFailed { .. }) => "probe_failed",
            Self::Media(_) => "media",
            Self::Storage(_) => "storage",
            Self::Store(_) => "store_unavailable",
            Self::Json(_) => "json",
            Self::ConfigError(_) => "config",
        }
    }
}
