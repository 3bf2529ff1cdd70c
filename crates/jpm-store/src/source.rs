//! Raw event source on a Redis Streams consumer group.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::EventSource;

/// Stream field holding the raw event JSON.
pub const EVENT_FIELD: &str = "event";

/// Retry counters expire after a day.
const RETRY_TTL_SECS: u64 = 86400;

/// A raw event read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMessage {
    pub id: String,
    pub payload: Value,
}

/// Event source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub redis_url: String,
    pub stream: String,
    pub consumer_group: String,
    /// Pending messages idle this long are reclaimed
    pub claim_idle: Duration,
    /// Stream receiving events that exhausted their retries
    pub dlq_stream: String,
    pub max_retries: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream: "jpm:events:raw".to_string(),
            consumer_group: "jpm:collectors".to_string(),
            claim_idle: Duration::from_secs(300),
            dlq_stream: "jpm:events:dlq".to_string(),
            max_retries: 3,
        }
    }
}

impl SourceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream: std::env::var("SOURCE_STREAM").unwrap_or_else(|_| "jpm:events:raw".to_string()),
            consumer_group: std::env::var("SOURCE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "jpm:collectors".to_string()),
            claim_idle: Duration::from_secs(
                std::env::var("SOURCE_CLAIM_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            dlq_stream: std::env::var("SOURCE_DLQ_STREAM")
                .unwrap_or_else(|_| "jpm:events:dlq".to_string()),
            max_retries: std::env::var("SOURCE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// Consumer-group reader over the raw event stream.
pub struct RedisEventSource {
    client: redis::Client,
    config: SourceConfig,
}

impl RedisEventSource {
    pub fn new(config: SourceConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(SourceConfig::from_env())
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    async fn connection(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::unavailable(e.to_string()))
    }

    fn retry_key(&self, message_id: &str) -> String {
        format!("{}:retry:{}", self.config.stream, message_id)
    }

    /// Failed deliveries recorded for a message.
    pub async fn retry_count(&self, message_id: &str) -> StoreResult<u32> {
        let mut conn = self.connection().await?;
        let count: Option<u32> = redis::cmd("GET")
            .arg(self.retry_key(message_id))
            .query_async(&mut conn)
            .await?;
        Ok(count.unwrap_or(0))
    }

    /// Append a raw event to the source stream.
    pub async fn push(&self, event: &Value) -> StoreResult<String> {
        let mut conn = self.connection().await?;
        let id: String = redis::cmd("XADD")
            .arg(&self.config.stream)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(serde_json::to_string(event)?)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    /// Decode stream entries. Entries without a JSON event are acked and
    /// dropped so they are not redelivered.
    async fn decode(&self, entries: Vec<redis::streams::StreamId>) -> Vec<SourceMessage> {
        let mut messages = Vec::with_capacity(entries.len());

        for entry in entries {
            let payload = match entry.map.get(EVENT_FIELD) {
                Some(redis::Value::BulkString(bytes)) => serde_json::from_slice::<Value>(bytes).ok(),
                _ => None,
            };

            match payload {
                Some(payload) => messages.push(SourceMessage {
                    id: entry.id,
                    payload,
                }),
                None => {
                    warn!(message_id = %entry.id, "Dropping stream entry without a JSON event");
                    self.ack(&entry.id).await.ok();
                }
            }
        }

        messages
    }
}

#[async_trait]
impl EventSource for RedisEventSource {
    async fn init(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(StoreError::Redis(e)),
        }

        Ok(())
    }

    async fn consume(&self, consumer: &str, block_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>> {
        let mut conn = self.connection().await?;

        // Nil reply when BLOCK times out
        let reply: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let entries = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();
        Ok(self.decode(entries).await)
    }

    async fn ack(&self, message_id: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged event message: {}", message_id);
        Ok(())
    }

    async fn claim_pending(&self, consumer: &str, min_idle_ms: u64, count: usize) -> StoreResult<Vec<SourceMessage>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if !reply.claimed.is_empty() {
            info!(count = reply.claimed.len(), "Claimed pending event messages");
        }
        Ok(self.decode(reply.claimed).await)
    }

    async fn increment_retry(&self, message_id: &str) -> StoreResult<u32> {
        let mut conn = self.connection().await?;
        let key = self.retry_key(message_id);

        let count: u32 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(RETRY_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(count)
    }

    async fn dead_letter(&self, message: &SourceMessage, error: &str) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream)
            .arg("*")
            .arg(EVENT_FIELD)
            .arg(serde_json::to_string(&message.payload)?)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&message.id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(&message.id).await?;
        redis::cmd("DEL")
            .arg(self.retry_key(&message.id))
            .query_async::<()>(&mut conn)
            .await?;

        warn!(message_id = %message.id, error = %error, "Moved event to DLQ");
        Ok(())
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries
    }
}
