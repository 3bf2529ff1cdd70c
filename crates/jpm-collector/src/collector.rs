//! Event collector: classify, merge, persist, broadcast.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, warn, Instrument};
use uuid::Uuid;

use jpm_media::{analyze_inputs, MediaProbe};
use jpm_models::{
    ClassifiedEvent, EventRecord, Job, JobStatus, MetricContext, RawEvent,
};
use jpm_store::{EventStore, JobStore, MetricPublisher, MetricStream, RecordPublisher};

use crate::config::CollectorConfig;
use crate::error::{CollectorError, CollectorResult};
use crate::logging::JobLogger;
use crate::merger::JobStateMerger;
use crate::metrics;

/// External collaborators of the collector.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub events: Arc<dyn EventStore>,
    pub publisher: Arc<dyn RecordPublisher>,
    pub metrics: Arc<dyn MetricPublisher>,
    pub probe: Arc<dyn MediaProbe>,
}

impl Collaborators {
    /// Use one backend for job records, event records and every stream.
    pub fn from_store<S>(store: Arc<S>, probe: Arc<dyn MediaProbe>, metric_stream: &str) -> Self
    where
        S: JobStore + EventStore + RecordPublisher + 'static,
    {
        let jobs: Arc<dyn JobStore> = store.clone();
        let events: Arc<dyn EventStore> = store.clone();
        let publisher: Arc<dyn RecordPublisher> = store;
        Self {
            metrics: Arc::new(MetricStream::new(publisher.clone(), metric_stream)),
            jobs,
            events,
            publisher,
            probe,
        }
    }
}

/// Handles one raw lifecycle event at a time.
///
/// Nothing is cached between events: each one re-reads the job record.
pub struct EventCollector {
    config: CollectorConfig,
    merger: JobStateMerger,
    collaborators: Collaborators,
}

impl EventCollector {
    pub fn new(config: CollectorConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            merger: JobStateMerger::new(),
            collaborators,
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Handle one raw event.
    ///
    /// Returns the merged job, or `None` when the event was rejected as
    /// malformed or unrecognized. Probe and store failures are returned as
    /// errors and nothing further is persisted for the event.
    pub async fn handle(&self, raw: Value) -> CollectorResult<Option<Job>> {
        let start = Instant::now();

        match self.process(raw).await {
            Ok((job, kind)) => {
                metrics::record_event_handled(kind, start.elapsed().as_secs_f64());
                Ok(Some(job))
            }
            Err(e) if e.is_rejection() => {
                warn!(reason = e.reason(), "Event rejected: {}", e);
                metrics::record_event_rejected(e.reason());
                Ok(None)
            }
            Err(e) => {
                error!(reason = e.reason(), "Event handling failed: {}", e);
                metrics::record_event_failed(e.reason());
                Err(e)
            }
        }
    }

    async fn process(&self, raw: Value) -> CollectorResult<(Job, &'static str)> {
        let mut event = RawEvent::from_value(raw)?;
        let classified = event.classify()?;

        let event_id = event
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        let event_time = event.event_time().unwrap_or(match &classified {
            ClassifiedEvent::Create(e) => e.timestamp,
            ClassifiedEvent::StateChange(e) => e.timestamp,
        });

        let kind = classified.kind();
        let logger = JobLogger::new(classified.job_id(), kind);
        let span = logger.create_span();

        async move {
            logger.log_received(&event_id, event_time);

            let job = match self.merge(&classified).await {
                Ok(job) => job,
                Err(e) => {
                    if !e.is_rejection() {
                        logger.log_error(&e.to_string());
                    }
                    return Err(e);
                }
            };
            let job = self.persist(job, event, event_time).await?;

            let emitted = self.emit_metrics(&job, event_time).await?;
            metrics::record_metric_records(emitted);
            debug!(emitted, "Metric records published");

            logger.log_merged(&job);
            Ok((job, kind))
        }
        .instrument(span)
        .await
    }

    async fn merge(&self, classified: &ClassifiedEvent) -> CollectorResult<Job> {
        let existing = self.collaborators.jobs.get_job(classified.job_id()).await?;

        let job = match classified {
            ClassifiedEvent::Create(create) => {
                // a redelivered creation event reuses the stored analysis
                let analysis = match existing.as_ref().and_then(|j| j.analysis.clone()) {
                    Some(analysis) => analysis,
                    None => {
                        analyze_inputs(self.collaborators.probe.as_ref(), &create.payload.settings)
                            .await
                            .map_err(CollectorError::from)?
                    }
                };
                self.merger.merge_creation(existing, create, analysis)
            }
            ClassifiedEvent::StateChange(change) => self.merger.merge_state_change(existing, change),
        };
        Ok(job)
    }

    /// Write the job and event records, then broadcast both.
    async fn persist(&self, mut job: Job, event: RawEvent, event_time: i64) -> CollectorResult<Job> {
        job.stamp_expiry(event_time, self.config.job_retention_secs());
        self.collaborators.jobs.put_job(&job).await?;

        let record = EventRecord::new(event, job.id.clone(), event_time, self.config.event_retention_secs());
        self.collaborators.events.put_event(&record).await?;

        self.collaborators
            .publisher
            .publish(&self.config.job_stream, job.id.as_str(), &serde_json::to_value(&job)?)
            .await?;
        self.collaborators
            .publisher
            .publish(
                &self.config.event_stream,
                record.event_id().unwrap_or_default(),
                &serde_json::to_value(&record)?,
            )
            .await?;

        Ok(job)
    }

    /// Progress metrics are stamped with `lastTime`, status indicators with
    /// the event time.
    async fn emit_metrics(&self, job: &Job, event_time: i64) -> CollectorResult<usize> {
        let context = MetricContext::for_job(job);
        let status = job.event_status.unwrap_or(JobStatus::Submitted);

        let mut records = context.progress_records(&job.progress_metrics, job.event_times.last_time);
        records.extend(context.status_records(status, event_time));

        for record in &records {
            self.collaborators.metrics.publish_metric(record).await?;
        }
        Ok(records.len())
    }
}
