//! Persistence and broadcast collaborators of the event collector.
//!
//! This crate provides:
//! - The [`JobStore`], [`EventStore`], [`RecordPublisher`],
//!   [`MetricPublisher`] and [`EventSource`] traits
//! - Redis implementations (records with expiry, Redis Streams broadcast,
//!   consumer-group event source)
//! - In-memory implementations for tests and local runs

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod source;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryEventSource, MemoryStore, PublishedRecord};
pub use redis_store::{RedisStore, RedisStoreConfig};
pub use source::{RedisEventSource, SourceConfig, SourceMessage};
pub use traits::{EventSource, EventStore, JobStore, MetricPublisher, MetricStream, RecordPublisher};
