//! Shared data models for the job progress metrics collector.
//!
//! This crate provides Serde-serializable types for:
//! - The merged per-job record and its lifecycle status
//! - Raw lifecycle events and their classification
//! - Progress metrics and their derivation
//! - Metric records emitted to the metric stream
//! - Timecode and timestamp normalization

pub mod error;
pub mod event;
pub mod job;
pub mod metric;
pub mod progress;
pub mod timecode;
pub mod timestamp;

// Re-export common types
pub use error::{ModelError, ModelResult};
pub use event::{
    ClassifiedEvent, CreateJobEvent, CreateJobPayload, EventRecord, RawEvent, StateChangeDetail,
    StateChangeEvent, StatusUpdate,
};
pub use job::{
    EventTimes, InputAnalysis, InputClipping, InputSettings, Job, JobAnalysis, JobId, JobSettings,
    JobStatus, OutputGroupSettings,
};
pub use metric::{Dimension, MetricContext, MetricRecord, QueueArn};
pub use progress::{derive_progress_metrics, ProgressMetrics};
pub use timecode::Timecode;
