//! In-memory collaborators.
//!
//! Records are kept as serialized JSON so reads go through the same
//! serialization boundary as the Redis store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use jpm_models::{EventRecord, Job, JobId};

use crate::error::{StoreError, StoreResult};
use crate::source::SourceMessage;
use crate::traits::{EventSource, EventStore, JobStore, RecordPublisher};

/// A record captured by [`MemoryStore`] as a publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRecord {
    pub stream: String,
    pub partition_key: String,
    pub record: Value,
}

/// In-memory job store, event store and publisher.
#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<HashMap<JobId, String>>,
    events: Mutex<Vec<String>>,
    published: Mutex<Vec<PublishedRecord>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::unavailable("memory store marked unavailable"))
        } else {
            Ok(())
        }
    }

    /// Stored job JSON, as written.
    pub async fn raw_job(&self, id: &JobId) -> Option<String> {
        self.jobs.lock().await.get(id).cloned()
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn events(&self) -> Vec<Value> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|s| serde_json::from_str(s).ok())
            .collect()
    }

    pub async fn published(&self) -> Vec<PublishedRecord> {
        self.published.lock().await.clone()
    }

    pub async fn published_to(&self, stream: &str) -> Vec<PublishedRecord> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|p| p.stream == stream)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        self.check()?;
        match self.jobs.lock().await.get(id) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    async fn put_job(&self, job: &Job) -> StoreResult<()> {
        self.check()?;
        let raw = serde_json::to_string(job)?;
        self.jobs.lock().await.insert(job.id.clone(), raw);
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn put_event(&self, event: &EventRecord) -> StoreResult<()> {
        self.check()?;
        if event.event_id().is_none() {
            return Err(StoreError::invalid_record("event record has no id"));
        }
        let raw = serde_json::to_string(event)?;
        self.events.lock().await.push(raw);
        Ok(())
    }
}

#[async_trait]
impl RecordPublisher for MemoryStore {
    async fn publish(&self, stream: &str, partition_key: &str, record: &Value) -> StoreResult<()> {
        self.check()?;
        self.published.lock().await.push(PublishedRecord {
            stream: stream.to_string(),
            partition_key: partition_key.to_string(),
            record: record.clone(),
        });
        Ok(())
    }
}

/// In-memory event source. Idle time is not tracked: every pending message
/// is claimable.
pub struct MemoryEventSource {
    queue: Mutex<VecDeque<SourceMessage>>,
    pending: Mutex<BTreeMap<String, SourceMessage>>,
    retries: Mutex<HashMap<String, u32>>,
    dead_letters: Mutex<Vec<(SourceMessage, String)>>,
    next_id: AtomicU64,
    max_retries: u32,
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self {
            queue: Mutex::default(),
            pending: Mutex::default(),
            retries: Mutex::default(),
            dead_letters: Mutex::default(),
            next_id: AtomicU64::new(0),
            max_retries: 3,
        }
    }
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Dead-lettered messages with the error that retired them.
    pub async fn dead_letters(&self) -> Vec<(SourceMessage, String)> {
        self.dead_letters.lock().await.clone()
    }

    /// Enqueue a raw event; returns its message id.
    pub async fn push(&self, payload: Value) -> String {
        let id = format!("{}-0", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.queue.lock().await.push_back(SourceMessage {
            id: id.clone(),
            payload,
        });
        id
    }

    pub async fn pending_ids(&self) -> Vec<String> {
        self.pending.lock().await.keys().cloned().collect()
    }

    pub async fn queued(&self) -> usize {
        self.queue.lock().await.len()
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn init(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn consume(&self, _consumer: &str, block_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>> {
        if block_ms > 0 && self.queue.lock().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(block_ms)).await;
        }

        let mut queue = self.queue.lock().await;
        let mut pending = self.pending.lock().await;

        let take = count.min(queue.len());
        let batch: Vec<SourceMessage> = queue.drain(..take).collect();
        for message in &batch {
            pending.insert(message.id.clone(), message.clone());
        }
        Ok(batch)
    }

    async fn ack(&self, message_id: &str) -> StoreResult<()> {
        self.pending.lock().await.remove(message_id);
        Ok(())
    }

    async fn claim_pending(&self, _consumer: &str, _min_idle_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>> {
        Ok(self.pending.lock().await.values().take(count).cloned().collect())
    }

    async fn increment_retry(&self, message_id: &str) -> StoreResult<u32> {
        let mut retries = self.retries.lock().await;
        let count = retries.entry(message_id.to_string()).or_default();
        *count += 1;
        Ok(*count)
    }

    async fn dead_letter(&self, message: &SourceMessage, error: &str) -> StoreResult<()> {
        self.dead_letters
            .lock()
            .await
            .push((message.clone(), error.to_string()));
        self.retries.lock().await.remove(&message.id);
        self.ack(&message.id).await
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}
