//! Redis store and event source integration tests.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use jpm_collector::{Collaborators, CollectorConfig, CollectorExecutor, EventCollector};
use jpm_media::{MediaProbe, MediaResult, TechnicalMetadata};
use jpm_models::event::STATE_CHANGE_DETAIL_TYPE;
use jpm_models::{EventRecord, Job, JobId, RawEvent};
use jpm_store::{
    EventSource, EventStore, JobStore, RecordPublisher, RedisEventSource, RedisStore,
    RedisStoreConfig, SourceConfig,
};

const QUEUE: &str = "arn:aws:mediaconvert:us-west-2:123456789012:queues/Default";

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Store with a per-test key prefix.
fn store() -> RedisStore {
    dotenvy::dotenv().ok();
    let config = RedisStoreConfig {
        key_prefix: format!("jpm-test-{}", Uuid::new_v4()),
        ..RedisStoreConfig::from_env()
    };
    RedisStore::new(config).expect("Failed to create Redis store")
}

fn source() -> RedisEventSource {
    dotenvy::dotenv().ok();
    let suffix = Uuid::new_v4();
    let config = SourceConfig {
        stream: format!("jpm-test:raw:{suffix}"),
        consumer_group: format!("jpm-test:group:{suffix}"),
        dlq_stream: format!("jpm-test:dlq:{suffix}"),
        max_retries: 2,
        ..SourceConfig::from_env()
    };
    RedisEventSource::new(config).expect("Failed to create event source")
}

fn state_change(event_id: &str, job_id: &str, status: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "detail-type": STATE_CHANGE_DETAIL_TYPE,
        "time": now(),
        "detail": {"jobId": job_id, "status": status, "queue": QUEUE}
    })
}

/// Test job record write, read and expiry.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_job_round_trip() {
    let store = store();
    let id = JobId::from_string(format!("job-{}", Uuid::new_v4()));

    assert!(store.get_job(&id).await.expect("get failed").is_none());

    let mut job = Job::synthesize(id.clone(), QUEUE, Default::default(), now());
    job.stamp_expiry(now(), 3600);
    store.put_job(&job).await.expect("put failed");

    let stored = store.get_job(&id).await.expect("get failed");
    assert_eq!(stored, Some(job));
}

/// Test that a redelivered event keeps its first record.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_event_records_are_indexed_once() {
    let store = store();
    let job_id = JobId::from_string(format!("job-{}", Uuid::new_v4()));
    let raw = RawEvent::from_value(state_change("evt-1", job_id.as_str(), "COMPLETE"))
        .expect("valid event");
    let record = EventRecord::new(raw, job_id.clone(), now(), 3600);

    store.put_event(&record).await.expect("put failed");
    store.put_event(&record).await.expect("redelivery failed");

    let ids = store.event_ids(&job_id).await.expect("index read failed");
    assert_eq!(ids, vec!["evt-1".to_string()]);
}

/// Test stream publishing.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_publish_to_stream() {
    let store = store();
    let stream = format!("jpm-test:jobs:{}", Uuid::new_v4());
    store
        .publish(&stream, "job-1", &json!({"id": "job-1"}))
        .await
        .expect("publish failed");
}

/// Test consumer group read, ack and reclaim.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_source_consume_ack_and_claim() {
    let source = source();
    source.init().await.expect("init failed");
    // a second init hits BUSYGROUP and is tolerated
    source.init().await.expect("re-init failed");

    source.push(&json!({"n": 1})).await.expect("push failed");
    source.push(&json!({"n": 2})).await.expect("push failed");

    let batch = source.consume("c1", 100, 10).await.expect("consume failed");
    assert_eq!(batch.len(), 2);
    source.ack(&batch[0].id).await.expect("ack failed");

    let reclaimed = source.claim_pending("c2", 0, 10).await.expect("claim failed");
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].payload, json!({"n": 2}));
}

/// Test retry counting and dead-lettering.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_source_dead_letter() {
    let source = source();
    source.init().await.expect("init failed");
    source.push(&json!({"n": 1})).await.expect("push failed");

    let batch = source.consume("c1", 100, 10).await.expect("consume failed");
    assert_eq!(batch.len(), 1);
    let message = &batch[0];

    assert_eq!(source.increment_retry(&message.id).await.expect("incr failed"), 1);
    assert_eq!(source.increment_retry(&message.id).await.expect("incr failed"), 2);
    assert_eq!(source.max_retries(), 2);

    source
        .dead_letter(message, "store unavailable")
        .await
        .expect("dead letter failed");

    assert_eq!(source.retry_count(&message.id).await.expect("get failed"), 0);
    let reclaimed = source.claim_pending("c2", 0, 10).await.expect("claim failed");
    assert!(reclaimed.is_empty());
}

struct NoInputsProbe;

#[async_trait]
impl MediaProbe for NoInputsProbe {
    async fn probe(&self, _file_input: &str) -> MediaResult<TechnicalMetadata> {
        Ok(TechnicalMetadata {
            frame_rate: 30.0,
            frame_count: 0,
            duration: 0.0,
            codec: None,
        })
    }
}

/// Test the collector end to end against Redis.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_collector_over_redis() {
    let store = Arc::new(store());
    let source = Arc::new(source());
    let job_id = JobId::from_string(format!("job-{}", Uuid::new_v4()));

    let config = CollectorConfig {
        job_stream: format!("jpm-test:jobs:{job_id}"),
        event_stream: format!("jpm-test:events:{job_id}"),
        metric_stream: format!("jpm-test:metrics:{job_id}"),
        block_time: Duration::from_millis(100),
        ..Default::default()
    };
    let collaborators = Collaborators::from_store(store.clone(), Arc::new(NoInputsProbe), &config.metric_stream);
    let executor = CollectorExecutor::new(EventCollector::new(config, collaborators), source.clone());

    source.init().await.expect("init failed");
    source
        .push(&state_change("evt-1", job_id.as_str(), "PROGRESSING"))
        .await
        .expect("push failed");
    source
        .push(&state_change("evt-2", job_id.as_str(), "COMPLETE"))
        .await
        .expect("push failed");

    let mut handled = 0;
    for _ in 0..10 {
        handled += executor.poll_once().await.expect("poll failed");
        if handled == 2 {
            break;
        }
    }
    assert_eq!(handled, 2);

    let job = store.get_job(&job_id).await.expect("get failed").expect("job stored");
    assert!(job.is_complete());
    assert_eq!(store.event_ids(&job_id).await.expect("index read failed").len(), 2);
}
