//! Metric records published to the metric stream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::job::{queue_name_from_arn, Job, JobStatus};
use crate::progress::ProgressMetrics;

/// Account and region parsed from a queue ARN.
///
/// `arn:aws:mediaconvert:us-west-2:123456789012:queues/Default`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueArn {
    pub region: String,
    pub account: String,
    pub queue_name: Option<String>,
}

impl QueueArn {
    /// Parse a queue ARN. Returns `None` when the region or account field is
    /// missing.
    pub fn parse(arn: &str) -> Option<Self> {
        let fields: Vec<&str> = arn.split(':').collect();
        let region = fields.get(3).filter(|s| !s.is_empty())?;
        let account = fields.get(4).filter(|s| !s.is_empty())?;
        Some(Self {
            region: region.to_string(),
            account: account.to_string(),
            queue_name: queue_name_from_arn(arn),
        })
    }
}

/// A metric dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One metric data point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    /// Epoch seconds
    pub timestamp: i64,
    pub dimensions: Vec<Dimension>,
    pub filters: BTreeMap<String, String>,
}

impl MetricRecord {
    /// Records are partitioned by metric name.
    pub fn partition_key(&self) -> &str {
        &self.name
    }
}

/// Dimensions and filters shared by every metric of one job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricContext {
    pub dimensions: Vec<Dimension>,
    pub filters: BTreeMap<String, String>,
}

impl MetricContext {
    pub fn for_job(job: &Job) -> Self {
        let mut dimensions = vec![
            Dimension::new("jobId", job.id.as_str()),
            Dimension::new("queue", job.queue.as_str()),
        ];

        let mut filters = BTreeMap::new();
        filters.insert("jobId".to_string(), job.id.to_string());
        if let Some(arn) = QueueArn::parse(&job.queue) {
            filters.insert("account".to_string(), arn.account);
            filters.insert("region".to_string(), arn.region);
        }
        filters.insert("queue".to_string(), job.queue.clone());
        if let Some(name) = job.queue_name.clone().or_else(|| queue_name_from_arn(&job.queue)) {
            filters.insert("queueName".to_string(), name);
        }

        for (key, value) in &job.user_metadata {
            dimensions.push(Dimension::new(key.as_str(), value.as_str()));
            filters.insert(key.clone(), value.clone());
        }

        Self {
            dimensions,
            filters,
        }
    }

    pub fn record(&self, name: impl Into<String>, value: f64, timestamp: i64) -> MetricRecord {
        MetricRecord {
            name: name.into(),
            value,
            timestamp,
            dimensions: self.dimensions.clone(),
            filters: self.filters.clone(),
        }
    }

    /// One record per numeric progress metric.
    pub fn progress_records(&self, metrics: &ProgressMetrics, timestamp: i64) -> Vec<MetricRecord> {
        metrics
            .entries()
            .into_iter()
            .map(|(name, value)| self.record(name, value, timestamp))
            .collect()
    }

    /// One indicator per status; exactly the `current` one is 1.
    pub fn status_records(&self, current: JobStatus, timestamp: i64) -> Vec<MetricRecord> {
        JobStatus::ALL
            .into_iter()
            .map(|status| {
                let value = if status == current { 1.0 } else { 0.0 };
                self.record(status.as_str(), value, timestamp)
            })
            .collect()
    }
}
