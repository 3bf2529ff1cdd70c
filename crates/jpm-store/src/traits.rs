//! Collaborator traits.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use jpm_models::{EventRecord, Job, JobId, MetricRecord};

use crate::error::StoreResult;
use crate::source::SourceMessage;

/// Durable per-job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Current record for `id`, read without caching.
    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>>;

    /// Replace the record for `job.id`.
    async fn put_job(&self, job: &Job) -> StoreResult<()>;
}

/// Append-only raw event records.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn put_event(&self, event: &EventRecord) -> StoreResult<()>;
}

/// Broadcast of JSON records to named, partitioned streams.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    async fn publish(&self, stream: &str, partition_key: &str, record: &Value) -> StoreResult<()>;
}

/// Broadcast of metric data points.
#[async_trait]
pub trait MetricPublisher: Send + Sync {
    async fn publish_metric(&self, metric: &MetricRecord) -> StoreResult<()>;
}

/// A consumer-group source of raw events.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Create the consumer group if needed.
    async fn init(&self) -> StoreResult<()>;

    /// Read up to `count` new messages, waiting at most `block_ms`.
    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>>;

    /// Mark a message as handled.
    async fn ack(&self, message_id: &str) -> StoreResult<()>;

    /// Take over messages left pending by failed deliveries.
    async fn claim_pending(&self, consumer: &str, min_idle_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>>;

    /// Count a failed delivery of `message_id`; returns the failures so far.
    async fn increment_retry(&self, message_id: &str) -> StoreResult<u32>;

    /// Move a message to the dead-letter stream and acknowledge it.
    async fn dead_letter(&self, message: &SourceMessage, error: &str) -> StoreResult<()>;

    /// Failed deliveries allowed before a message is dead-lettered.
    fn max_retries(&self) -> u32;
}

/// Publishes metrics to one stream of a [`RecordPublisher`], partitioned by
/// metric name.
pub struct MetricStream {
    publisher: Arc<dyn RecordPublisher>,
    stream: String,
}

impl MetricStream {
    pub fn new(publisher: Arc<dyn RecordPublisher>, stream: impl Into<String>) -> Self {
        Self {
            publisher,
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl MetricPublisher for MetricStream {
    async fn publish_metric(&self, metric: &MetricRecord) -> StoreResult<()> {
        let record = serde_json::to_value(metric)?;
        self.publisher
            .publish(&self.stream, metric.partition_key(), &record)
            .await
    }
}
