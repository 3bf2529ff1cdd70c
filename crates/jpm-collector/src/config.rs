//! Collector configuration.

use std::net::SocketAddr;
use std::time::Duration;

const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Collector configuration.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Job record retention in days
    pub job_retention_days: i64,
    /// Event record retention in days
    pub event_retention_days: i64,
    /// Stream receiving every merged job record
    pub job_stream: String,
    /// Stream receiving every persisted event record
    pub event_stream: String,
    /// Stream receiving metric records
    pub metric_stream: String,
    /// Prometheus listener; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    /// Messages read per poll
    pub batch_size: usize,
    /// Poll block time
    pub block_time: Duration,
    /// How often pending messages are reclaimed
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message is reclaimed
    pub claim_min_idle: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            job_retention_days: 7,
            event_retention_days: 7,
            job_stream: "jpm:jobs".to_string(),
            event_stream: "jpm:events".to_string(),
            metric_stream: "jpm:metrics".to_string(),
            metrics_addr: None,
            batch_size: 10,
            block_time: Duration::from_secs(1),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
        }
    }
}

impl CollectorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            job_retention_days: std::env::var("JOB_TABLE_TTL_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
            event_retention_days: std::env::var("EVENT_TABLE_TTL_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7),
            job_stream: std::env::var("JOB_STREAM").unwrap_or_else(|_| "jpm:jobs".to_string()),
            event_stream: std::env::var("EVENT_STREAM").unwrap_or_else(|_| "jpm:events".to_string()),
            metric_stream: std::env::var("METRIC_STREAM")
                .unwrap_or_else(|_| "jpm:metrics".to_string()),
            metrics_addr: std::env::var("COLLECTOR_METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
            batch_size: std::env::var("COLLECTOR_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            block_time: Duration::from_millis(
                std::env::var("COLLECTOR_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("COLLECTOR_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("COLLECTOR_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        }
    }

    pub fn job_retention_secs(&self) -> i64 {
        self.job_retention_days * SECONDS_PER_DAY
    }

    pub fn event_retention_secs(&self) -> i64 {
        self.event_retention_days * SECONDS_PER_DAY
    }
}
