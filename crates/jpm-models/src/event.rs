//! Raw lifecycle events and their classification.
//!
//! Two event families reach the collector:
//! - the audit record of the job-creation API call, carrying the full job
//!   payload (`detail-type` = [`CREATE_JOB_DETAIL_TYPE`], `eventName` =
//!   `CreateJob`)
//! - state-change notifications (`detail-type` = [`STATE_CHANGE_DETAIL_TYPE`])
//!
//! The envelope is kept verbatim so it can be persisted and forwarded as is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{ModelError, ModelResult};
use crate::job::{JobId, JobSettings, JobStatus};
use crate::timestamp::epoch_seconds;

pub const CREATE_JOB_DETAIL_TYPE: &str = "AWS API Call via CloudTrail";
pub const CREATE_JOB_EVENT_NAME: &str = "CreateJob";
pub const STATE_CHANGE_DETAIL_TYPE: &str = "MediaConvert Job State Change";

/// Event envelope as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "detail-type")]
    pub detail_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Value>,

    #[serde(default)]
    pub detail: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// Parse an envelope from JSON.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| ModelError::malformed(format!("event envelope: {e}")))
    }

    /// Envelope time in epoch seconds.
    pub fn event_time(&self) -> ModelResult<i64> {
        let time = self
            .time
            .as_ref()
            .ok_or_else(|| ModelError::malformed("event has no time"))?;
        epoch_seconds(time)
    }

    /// Classify by `detail-type` and parse the family-specific payload.
    pub fn classify(&self) -> ModelResult<ClassifiedEvent> {
        match self.detail_type.as_str() {
            CREATE_JOB_DETAIL_TYPE => {
                let event_name = self.detail.get("eventName").and_then(Value::as_str);
                if event_name != Some(CREATE_JOB_EVENT_NAME) {
                    return Err(ModelError::unrecognized(format!(
                        "{} / {}",
                        self.detail_type,
                        event_name.unwrap_or("<no eventName>")
                    )));
                }
                CreateJobEvent::parse(self).map(ClassifiedEvent::Create)
            }
            STATE_CHANGE_DETAIL_TYPE => StateChangeEvent::parse(self).map(ClassifiedEvent::StateChange),
            other => Err(ModelError::unrecognized(other)),
        }
    }
}

/// A classified event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent {
    Create(CreateJobEvent),
    StateChange(StateChangeEvent),
}

impl ClassifiedEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            ClassifiedEvent::Create(e) => &e.payload.id,
            ClassifiedEvent::StateChange(e) => &e.detail.job_id,
        }
    }

    /// Event kind for logs and operational metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ClassifiedEvent::Create(_) => "CREATE",
            ClassifiedEvent::StateChange(e) => e.detail.update.kind(),
        }
    }
}

/// Job payload of the creation call (`detail.responseElements.job`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobPayload {
    pub id: JobId,
    pub status: JobStatus,
    pub queue: String,
    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,
    pub settings: JobSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    /// `arn`, `role`, `timing` and anything else, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A job-creation event.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateJobEvent {
    /// Creation time (`createdAt`, else the envelope time), epoch seconds
    pub timestamp: i64,
    pub payload: CreateJobPayload,
}

impl CreateJobEvent {
    fn parse(raw: &RawEvent) -> ModelResult<Self> {
        let job = raw
            .detail
            .pointer("/responseElements/job")
            .cloned()
            .ok_or_else(|| ModelError::malformed("creation event has no responseElements.job"))?;
        let payload: CreateJobPayload = serde_json::from_value(job)
            .map_err(|e| ModelError::malformed(format!("creation job payload: {e}")))?;

        let timestamp = match &payload.created_at {
            Some(created_at) => epoch_seconds(created_at)?,
            None => raw.event_time()?,
        };

        Ok(Self { timestamp, payload })
    }
}

/// What a state-change event reports.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Submitted,
    Progressing,
    StatusUpdate {
        frames_decoded: i64,
        job_percent_complete: i64,
        current_phase: String,
        /// Progress of `current_phase`, when reported
        phase_percent_complete: Option<i64>,
    },
    InputInformation(Value),
    Complete,
    Error {
        error_code: Option<Value>,
        error_message: Option<String>,
    },
}

impl StatusUpdate {
    pub fn kind(&self) -> &'static str {
        match self {
            StatusUpdate::Submitted => "SUBMITTED",
            StatusUpdate::Progressing => "PROGRESSING",
            StatusUpdate::StatusUpdate { .. } => "STATUS_UPDATE",
            StatusUpdate::InputInformation(_) => "INPUT_INFORMATION",
            StatusUpdate::Complete => "COMPLETE",
            StatusUpdate::Error { .. } => "ERROR",
        }
    }
}

/// Parsed `detail` of a state-change event.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeDetail {
    pub job_id: JobId,
    pub queue: String,
    pub user_metadata: BTreeMap<String, String>,
    pub update: StatusUpdate,
}

/// A state-change event.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangeEvent {
    /// Envelope time, epoch seconds
    pub timestamp: i64,
    pub detail: StateChangeDetail,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDetail {
    job_id: JobId,
    status: String,
    queue: String,
    #[serde(default)]
    user_metadata: BTreeMap<String, String>,
    #[serde(default)]
    frames_decoded: Option<i64>,
    #[serde(default)]
    job_progress: Option<WireJobProgress>,
    #[serde(default)]
    input_details: Option<Value>,
    #[serde(default)]
    error_code: Option<Value>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJobProgress {
    job_percent_complete: i64,
    current_phase: String,
    #[serde(default)]
    phase_progress: BTreeMap<String, WirePhaseProgress>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePhaseProgress {
    #[serde(default)]
    percent_complete: Option<i64>,
}

impl StateChangeEvent {
    fn parse(raw: &RawEvent) -> ModelResult<Self> {
        let timestamp = raw.event_time()?;
        let wire: WireDetail = serde_json::from_value(raw.detail.clone())
            .map_err(|e| ModelError::malformed(format!("state change detail: {e}")))?;

        let update = match wire.status.as_str() {
            "SUBMITTED" => StatusUpdate::Submitted,
            "PROGRESSING" => StatusUpdate::Progressing,
            "COMPLETE" => StatusUpdate::Complete,
            "ERROR" => StatusUpdate::Error {
                error_code: wire.error_code,
                error_message: wire.error_message,
            },
            "INPUT_INFORMATION" => StatusUpdate::InputInformation(
                wire.input_details
                    .ok_or_else(|| ModelError::malformed("INPUT_INFORMATION without inputDetails"))?,
            ),
            "STATUS_UPDATE" => {
                let frames_decoded = wire
                    .frames_decoded
                    .ok_or_else(|| ModelError::malformed("STATUS_UPDATE without framesDecoded"))?;
                let progress = wire
                    .job_progress
                    .ok_or_else(|| ModelError::malformed("STATUS_UPDATE without jobProgress"))?;
                let phase_percent_complete = progress
                    .phase_progress
                    .get(&progress.current_phase)
                    .and_then(|p| p.percent_complete);
                StatusUpdate::StatusUpdate {
                    frames_decoded,
                    job_percent_complete: progress.job_percent_complete,
                    current_phase: progress.current_phase,
                    phase_percent_complete,
                }
            }
            other => {
                return Err(ModelError::malformed(format!(
                    "unknown job status {other:?}"
                )))
            }
        };

        Ok(Self {
            timestamp,
            detail: StateChangeDetail {
                job_id: wire.job_id,
                queue: wire.queue,
                user_metadata: wire.user_metadata,
                update,
            },
        })
    }
}

/// A raw event as persisted to the event store, with expiry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    #[serde(flatten)]
    pub event: RawEvent,
    pub job_id: JobId,
    /// Envelope time, epoch seconds
    pub timestamp: i64,
    #[serde(rename = "timestampTTL")]
    pub timestamp_ttl: i64,
}

impl EventRecord {
    pub fn new(event: RawEvent, job_id: JobId, timestamp: i64, retention_secs: i64) -> Self {
        Self {
            event,
            job_id,
            timestamp,
            timestamp_ttl: timestamp + retention_secs,
        }
    }

    /// Event id, the partition key on the event stream.
    pub fn event_id(&self) -> Option<&str> {
        self.event.id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const QUEUE: &str = "arn:aws:mediaconvert:us-west-2:123456789012:queues/Default";

    fn state_change(detail: Value) -> RawEvent {
        RawEvent::from_value(json!({
            "id": "evt-1",
            "detail-type": STATE_CHANGE_DETAIL_TYPE,
            "source": "aws.mediaconvert",
            "time": "2019-09-10T15:30:26Z",
            "detail": detail
        }))
        .unwrap()
    }

    #[test]
    fn test_classify_status_update() {
        let raw = state_change(json!({
            "jobId": "job-1",
            "status": "STATUS_UPDATE",
            "queue": QUEUE,
            "userMetadata": {"app": "vod"},
            "framesDecoded": 120,
            "jobProgress": {
                "jobPercentComplete": 12,
                "currentPhase": "TRANSCODING",
                "phaseProgress": {
                    "PROBING": {"status": "COMPLETE", "percentComplete": 100},
                    "TRANSCODING": {"status": "PROGRESSING", "percentComplete": 7}
                }
            }
        }));

        let ClassifiedEvent::StateChange(event) = raw.classify().unwrap() else {
            panic!("expected state change");
        };
        assert_eq!(event.timestamp, 1_568_129_426);
        assert_eq!(event.detail.job_id.as_str(), "job-1");
        assert_eq!(event.detail.user_metadata["app"], "vod");
        assert_eq!(
            event.detail.update,
            StatusUpdate::StatusUpdate {
                frames_decoded: 120,
                job_percent_complete: 12,
                current_phase: "TRANSCODING".into(),
                phase_percent_complete: Some(7),
            }
        );
    }

    #[test]
    fn test_status_update_requires_progress_fields() {
        let raw = state_change(json!({
            "jobId": "job-1", "status": "STATUS_UPDATE", "queue": QUEUE
        }));
        assert!(matches!(raw.classify(), Err(ModelError::MalformedEvent(_))));
    }

    #[test]
    fn test_unknown_status_is_malformed() {
        let raw = state_change(json!({"jobId": "job-1", "status": "PAUSED", "queue": QUEUE}));
        assert!(matches!(raw.classify(), Err(ModelError::MalformedEvent(_))));
    }

    #[test]
    fn test_missing_time_is_malformed() {
        let mut raw = state_change(json!({"jobId": "job-1", "status": "COMPLETE", "queue": QUEUE}));
        raw.time = None;
        assert!(matches!(raw.classify(), Err(ModelError::MalformedEvent(_))));
    }

    #[test]
    fn test_classify_create_job() {
        let raw = RawEvent::from_value(json!({
            "id": "evt-0",
            "detail-type": CREATE_JOB_DETAIL_TYPE,
            "time": "2019-09-10T15:30:20Z",
            "detail": {
                "eventName": "CreateJob",
                "responseElements": {"job": {
                    "id": "job-1",
                    "arn": "arn:aws:mediaconvert:us-west-2:123456789012:jobs/job-1",
                    "status": "SUBMITTED",
                    "queue": QUEUE,
                    "createdAt": 1_568_129_418,
                    "userMetadata": {},
                    "settings": {"inputs": [{"fileInput": "s3://b/in.mp4"}], "outputGroups": []}
                }}
            }
        }))
        .unwrap();

        let event = raw.classify().unwrap();
        assert_eq!(event.kind(), "CREATE");
        assert_eq!(event.job_id().as_str(), "job-1");
        let ClassifiedEvent::Create(create) = event else {
            panic!("expected creation");
        };
        assert_eq!(create.timestamp, 1_568_129_418);
        assert_eq!(create.payload.status, JobStatus::Submitted);
        assert!(create.payload.extra.contains_key("arn"));
    }

    #[test]
    fn test_other_api_calls_are_unrecognized() {
        let raw = RawEvent::from_value(json!({
            "detail-type": CREATE_JOB_DETAIL_TYPE,
            "time": "2019-09-10T15:30:20Z",
            "detail": {"eventName": "CancelJob"}
        }))
        .unwrap();
        assert!(matches!(raw.classify(), Err(ModelError::UnrecognizedEventType(_))));
    }

    #[test]
    fn test_unknown_detail_type_is_unrecognized() {
        let raw = RawEvent::from_value(json!({"detail-type": "Scheduled Event", "detail": {}})).unwrap();
        assert!(matches!(raw.classify(), Err(ModelError::UnrecognizedEventType(_))));
    }

    #[test]
    fn test_envelope_without_type_is_malformed() {
        assert!(matches!(
            RawEvent::from_value(json!({"detail": {}})),
            Err(ModelError::MalformedEvent(_))
        ));
    }

    #[test]
    fn test_event_record_keeps_envelope() {
        let raw = state_change(json!({"jobId": "job-1", "status": "COMPLETE", "queue": QUEUE}));
        let record = EventRecord::new(raw, JobId::from_string("job-1"), 100, 86_400);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["source"], "aws.mediaconvert");
        assert_eq!(value["detail-type"], STATE_CHANGE_DETAIL_TYPE);
        assert_eq!(value["jobId"], "job-1");
        assert_eq!(value["timestamp"], 100);
        assert_eq!(value["timestampTTL"], 86_500);
        assert_eq!(record.event_id(), Some("evt-1"));
    }
}
