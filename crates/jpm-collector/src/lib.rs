//! Transcoding job event collector.
//!
//! This crate provides:
//! - The job state merger (out-of-order event reconciliation)
//! - The event collector (classify, merge, persist, broadcast)
//! - The consumer loop over the raw event source
//! - Operational metrics and structured logging

pub mod collector;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod merger;
pub mod metrics;

pub use collector::{Collaborators, EventCollector};
pub use config::CollectorConfig;
pub use error::{CollectorError, CollectorResult};
pub use executor::CollectorExecutor;
pub use logging::JobLogger;
pub use merger::JobStateMerger;
