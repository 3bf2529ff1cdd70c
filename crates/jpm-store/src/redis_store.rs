//! Job and event records on Redis, and Redis Streams broadcast.
//!
//! Key layout, with the default `jpm` prefix:
//! - `jpm:job:{job_id}` JSON job record, expiring at `timestampTTL`
//! - `jpm:event:{event_id}` JSON event record, written once
//! - `jpm:job-events:{job_id}` sorted set of event ids by event time

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use jpm_models::{EventRecord, Job, JobId};

use crate::error::{StoreError, StoreResult};
use crate::traits::{EventStore, JobStore, RecordPublisher};

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
    /// Approximate cap on published stream length
    pub stream_max_len: Option<usize>,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "jpm".to_string(),
            stream_max_len: Some(100_000),
        }
    }
}

impl RedisStoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or_else(|_| "jpm".to_string()),
            stream_max_len: match std::env::var("STREAM_MAX_LEN") {
                Ok(v) => v.parse().ok().filter(|n| *n > 0),
                Err(_) => Some(100_000),
            },
        }
    }
}

/// Redis-backed job store, event store and stream publisher.
pub struct RedisStore {
    client: redis::Client,
    config: RedisStoreConfig,
}

impl RedisStore {
    pub fn new(config: RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(RedisStoreConfig::from_env())
    }

    pub fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    pub fn event_key(&self, event_id: &str) -> String {
        format!("{}:event:{}", self.config.key_prefix, event_id)
    }

    pub fn job_events_key(&self, id: &JobId) -> String {
        format!("{}:job-events:{}", self.config.key_prefix, id)
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    /// Event ids recorded for a job, oldest first.
    pub async fn event_ids(&self, id: &JobId) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let ids: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.job_events_key(id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(ids)
    }
}

/// `SET key value [EXAT ttl] [NX]`
fn set_cmd(key: &str, value: &str, expire_at: Option<i64>, only_new: bool) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(value);
    if let Some(ttl) = expire_at {
        cmd.arg("EXAT").arg(ttl);
    }
    if only_new {
        cmd.arg("NX");
    }
    cmd
}

#[async_trait]
impl JobStore for RedisStore {
    async fn get_job(&self, id: &JobId) -> StoreResult<Option<Job>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.job_key(id))
            .query_async(&mut conn)
            .await?;

        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn put_job(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(job)?;

        set_cmd(&self.job_key(&job.id), &payload, job.timestamp_ttl, false)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(job_id = %job.id, "Stored job record");
        Ok(())
    }
}

#[async_trait]
impl EventStore for RedisStore {
    async fn put_event(&self, event: &EventRecord) -> StoreResult<()> {
        let event_id = event
            .event_id()
            .ok_or_else(|| StoreError::invalid_record("event record has no id"))?;
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(event)?;

        // NX: a redelivered event keeps its first record
        let written: Option<String> = set_cmd(
            &self.event_key(event_id),
            &payload,
            Some(event.timestamp_ttl),
            true,
        )
        .query_async(&mut conn)
        .await?;

        let index_key = self.job_events_key(&event.job_id);
        redis::pipe()
            .cmd("ZADD")
            .arg(&index_key)
            .arg(event.timestamp)
            .arg(event_id)
            .ignore()
            .cmd("EXPIREAT")
            .arg(&index_key)
            .arg(event.timestamp_ttl)
            .arg("NX")
            .ignore()
            .cmd("EXPIREAT")
            .arg(&index_key)
            .arg(event.timestamp_ttl)
            .arg("GT")
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!(
            job_id = %event.job_id,
            event_id,
            duplicate = written.is_none(),
            "Stored event record"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordPublisher for RedisStore {
    async fn publish(&self, stream: &str, partition_key: &str, record: &Value) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(record)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream);
        if let Some(max_len) = self.config.stream_max_len {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        let message_id: String = cmd
            .arg("*")
            .arg("key")
            .arg(partition_key)
            .arg("data")
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(stream, partition_key, message_id = %message_id, "Published record");
        Ok(())
    }
}
