//! Structured event logging.
//!
//! Every line carries the job id and event kind so one job's history can be
//! followed across out-of-order deliveries.

use tracing::{error, info, Span};

use jpm_models::{Job, JobId};

/// Logger bound to one job and one event kind.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn log_received(&self, event_id: &str, event_time: i64) {
        info!(
            job_id = %self.job_id,
            kind = %self.kind,
            event_id,
            event_time,
            "Event received"
        );
    }

    /// Log the merged record.
    pub fn log_merged(&self, job: &Job) {
        info!(
            job_id = %self.job_id,
            kind = %self.kind,
            status = job.status.map(|s| s.as_str()).unwrap_or("-"),
            event_status = job.event_status.map(|s| s.as_str()).unwrap_or("-"),
            last_time = job.event_times.last_time,
            frames_decoded = job.progress_metrics.frames_decoded,
            "Job merged"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            kind = %self.kind,
            "Event failed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "event",
            job_id = %self.job_id,
            kind = %self.kind
        )
    }
}
