//! Consumer loop feeding the collector from an event source.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jpm_store::{EventSource, SourceMessage};

use crate::collector::EventCollector;
use crate::error::CollectorResult;
use crate::metrics;

/// Reads raw events from an [`EventSource`] and hands them to the collector
/// one at a time.
///
/// Handled and rejected messages are acknowledged. Messages whose handling
/// failed stay pending and are reclaimed once idle for
/// `claim_min_idle`, until the source's `max_retries` failures have been
/// counted; the message then moves to the dead-letter stream.
pub struct CollectorExecutor {
    collector: Arc<EventCollector>,
    source: Arc<dyn EventSource>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl CollectorExecutor {
    pub fn new(collector: EventCollector, source: Arc<dyn EventSource>) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            collector: Arc::new(collector),
            source,
            shutdown,
            consumer_name: format!("collector-{}", Uuid::new_v4()),
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Run until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> CollectorResult<()> {
        let config = self.collector.config();
        info!(
            consumer = %self.consumer_name,
            batch_size = config.batch_size,
            "Starting collector executor"
        );

        self.source.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut claim_interval = tokio::time::interval(config.claim_interval);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                _ = claim_interval.tick() => {
                    if let Err(e) = self.reclaim_pending().await {
                        warn!("Failed to claim pending events: {}", e);
                    }
                }
                result = self.poll_once() => {
                    if let Err(e) = result {
                        error!("Error consuming events: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        info!("Collector executor stopped");
        Ok(())
    }

    /// Consume and handle one batch. Returns the number of messages read.
    pub async fn poll_once(&self) -> CollectorResult<usize> {
        let config = self.collector.config();
        let messages = self
            .source
            .consume(
                &self.consumer_name,
                config.block_time.as_millis() as u64,
                config.batch_size,
            )
            .await?;

        if messages.is_empty() {
            return Ok(0);
        }
        debug!("Consumed {} events", messages.len());

        let count = messages.len();
        for message in messages {
            self.handle_message(message).await;
        }
        Ok(count)
    }

    /// Take over and handle messages left pending by failed deliveries.
    pub async fn reclaim_pending(&self) -> CollectorResult<usize> {
        let config = self.collector.config();
        let messages = self
            .source
            .claim_pending(
                &self.consumer_name,
                config.claim_min_idle.as_millis() as u64,
                config.batch_size,
            )
            .await?;

        if messages.is_empty() {
            return Ok(0);
        }
        info!("Claimed {} pending events", messages.len());
        metrics::record_pending_claimed(messages.len());

        let count = messages.len();
        for message in messages {
            self.handle_message(message).await;
        }
        Ok(count)
    }

    async fn handle_message(&self, message: SourceMessage) {
        let message_id = message.id.clone();
        match self.collector.handle(message.payload.clone()).await {
            Ok(_) => {
                if let Err(e) = self.source.ack(&message_id).await {
                    error!(message_id = %message_id, "Failed to ack event: {}", e);
                }
            }
            Err(e) => {
                let attempts = self
                    .source
                    .increment_retry(&message_id)
                    .await
                    .unwrap_or(u32::MAX);

                if attempts >= self.source.max_retries() {
                    error!(
                        message_id = %message_id,
                        attempts = attempts,
                        "Event failed permanently: {}", e
                    );
                    match self.source.dead_letter(&message, &e.to_string()).await {
                        Ok(()) => metrics::record_dead_lettered(),
                        Err(dlq_err) => {
                            error!(message_id = %message_id, "Failed to move event to DLQ: {}", dlq_err);
                        }
                    }
                } else {
                    // left pending for reclaim
                    warn!(message_id = %message_id, attempts = attempts, "Event will be retried: {}", e);
                }
            }
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
