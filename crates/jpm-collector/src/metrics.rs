//! Prometheus metrics for the collector.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{CollectorError, CollectorResult};

/// Install the Prometheus recorder with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> CollectorResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| CollectorError::config_error(format!("metrics exporter: {e}")))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const EVENTS_HANDLED_TOTAL: &str = "jpm_events_handled_total";
    pub const EVENTS_REJECTED_TOTAL: &str = "jpm_events_rejected_total";
    pub const EVENTS_FAILED_TOTAL: &str = "jpm_events_failed_total";
    pub const EVENT_DURATION_SECONDS: &str = "jpm_event_duration_seconds";
    pub const METRIC_RECORDS_EMITTED_TOTAL: &str = "jpm_metric_records_emitted_total";
    pub const PENDING_CLAIMED_TOTAL: &str = "jpm_pending_claimed_total";
    pub const EVENTS_DEAD_LETTERED_TOTAL: &str = "jpm_events_dead_lettered_total";
}

pub fn record_event_handled(kind: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string())];
    counter!(names::EVENTS_HANDLED_TOTAL, &labels).increment(1);
    histogram!(names::EVENT_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_event_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::EVENTS_REJECTED_TOTAL, &labels).increment(1);
}

pub fn record_event_failed(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::EVENTS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_metric_records(count: usize) {
    counter!(names::METRIC_RECORDS_EMITTED_TOTAL).increment(count as u64);
}

pub fn record_pending_claimed(count: usize) {
    counter!(names::PENDING_CLAIMED_TOTAL).increment(count as u64);
}

pub fn record_dead_lettered() {
    counter!(names::EVENTS_DEAD_LETTERED_TOTAL).increment(1);
}
