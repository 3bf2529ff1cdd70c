//! The merged per-job record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::progress::{derive_progress_metrics, ProgressMetrics};

/// Unique identifier for a transcoding job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted and queued
    Submitted,
    /// Picked up by the transcoder
    Progressing,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Error,
}

impl JobStatus {
    /// Every status, in status-metric emission order.
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Submitted,
        JobStatus::Progressing,
        JobStatus::Error,
        JobStatus::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Progressing => "PROGRESSING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Error => "ERROR",
        }
    }

    /// Parse the wire vocabulary.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUBMITTED" => Some(JobStatus::Submitted),
            "PROGRESSING" => Some(JobStatus::Progressing),
            "COMPLETE" => Some(JobStatus::Complete),
            "ERROR" => Some(JobStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Named event timestamps, in epoch seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_progressing_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progressing_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_time: Option<i64>,
    /// Latest timestamp seen for the job
    pub last_time: i64,
}

impl EventTimes {
    /// Times for a job whose first event happened at `ts`.
    pub fn starting_at(ts: i64) -> Self {
        Self {
            last_time: ts,
            ..Default::default()
        }
    }

    /// Move `lastTime` forward to `ts`. Never moves it back.
    pub fn advance(&mut self, ts: i64) {
        if ts > self.last_time {
            self.last_time = ts;
        }
    }

    /// Largest timestamp recorded under any key.
    pub fn latest_recorded(&self) -> i64 {
        [
            self.create_time,
            self.first_progressing_time,
            self.last_progressing_time,
            self.last_status_time,
            self.decode_time,
            self.complete_time,
            self.error_time,
        ]
        .into_iter()
        .flatten()
        .fold(self.last_time, i64::max)
    }
}

/// A clip range on a job input, in `HH:MM:SS:FF` timecodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputClipping {
    #[serde(default, alias = "StartTimecode", skip_serializing_if = "Option::is_none")]
    pub start_timecode: Option<String>,
    #[serde(default, alias = "EndTimecode", skip_serializing_if = "Option::is_none")]
    pub end_timecode: Option<String>,
}

/// One input of a job's settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSettings {
    /// Object URL of the input, e.g. `s3://bucket/key.mp4`
    #[serde(alias = "FileInput")]
    pub file_input: String,
    #[serde(default, alias = "InputClippings", skip_serializing_if = "Vec::is_empty")]
    pub input_clippings: Vec<InputClipping>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One output group of a job's settings. Only the output count matters here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputGroupSettings {
    #[serde(default, alias = "Outputs")]
    pub outputs: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Job settings as submitted, typed only where analysis needs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    #[serde(default, alias = "Inputs")]
    pub inputs: Vec<InputSettings>,
    #[serde(default, alias = "OutputGroups")]
    pub output_groups: Vec<OutputGroupSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobSettings {
    pub fn num_outputs(&self) -> usize {
        self.output_groups.iter().map(|og| og.outputs.len()).sum()
    }
}

/// Technical analysis of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAnalysis {
    pub file_input: String,
    pub frame_rate: f64,
    /// Effective frames, honouring clip ranges
    pub frame_count: i64,
    /// Effective duration in seconds
    pub duration: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
}

/// Analysis computed once, when the creation event is processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAnalysis {
    /// Total frames over all inputs
    pub frame_count: i64,
    #[serde(rename = "num_inputs")]
    pub num_inputs: usize,
    #[serde(rename = "num_outputs")]
    pub num_outputs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputAnalysis>,
}

/// The merged state of one transcoding job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,

    /// Authoritative lifecycle status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,

    /// Status implied by the latest event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_status: Option<JobStatus>,

    /// Queue ARN
    pub queue: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_name: Option<String>,

    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,

    pub event_times: EventTimes,

    #[serde(default)]
    pub progress_metrics: ProgressMetrics,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<JobAnalysis>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_details: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<JobSettings>,

    /// Creation time reported by the transcoder, epoch seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    /// Index filters (job id, account, region, queue, user metadata)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,

    /// Mirrors `eventTimes.lastTime` for store-side indexing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Expiry, epoch seconds
    #[serde(default, rename = "timestampTTL", skip_serializing_if = "Option::is_none")]
    pub timestamp_ttl: Option<i64>,

    /// Remaining fields of the creation payload, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Job {
    /// Minimal record for a job first seen through a state-change event.
    pub fn synthesize(
        id: JobId,
        queue: impl Into<String>,
        user_metadata: BTreeMap<String, String>,
        ts: i64,
    ) -> Self {
        let queue = queue.into();
        Self {
            id,
            status: None,
            event_status: None,
            queue_name: queue_name_from_arn(&queue),
            queue,
            user_metadata,
            event_times: EventTimes::starting_at(ts),
            progress_metrics: ProgressMetrics::default(),
            analysis: None,
            input_details: None,
            settings: None,
            created_at: None,
            filters: BTreeMap::new(),
            timestamp: None,
            timestamp_ttl: None,
            extra: Map::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == Some(JobStatus::Complete)
    }

    /// Frame count from the creation-time analysis, if known.
    pub fn frame_count(&self) -> Option<i64> {
        self.analysis.as_ref().map(|a| a.frame_count)
    }

    /// Replace `progressMetrics` with a full recomputation.
    pub fn recompute_metrics(&mut self) {
        self.progress_metrics = derive_progress_metrics(
            &self.event_times,
            self.analysis.as_ref(),
            &self.progress_metrics,
        );
    }

    /// Stamp the store expiry fields before persisting.
    pub fn stamp_expiry(&mut self, event_time: i64, retention_secs: i64) {
        self.timestamp = Some(self.event_times.last_time);
        self.timestamp_ttl = Some(event_time + retention_secs);
    }
}

/// Queue name from a queue ARN (`arn:...:queues/Default` -> `Default`).
pub fn queue_name_from_arn(queue: &str) -> Option<String> {
    queue
        .split_once('/')
        .map(|(_, name)| name.split('/').next().unwrap_or(name).to_string())
        .filter(|name| !name.is_empty())
}
