//! S3 object access for media analysis inputs.
//!
//! This crate provides:
//! - `s3://bucket/key` location parsing
//! - Presigned GET URL generation
//! - The [`ObjectUrlSigner`] seam used by the media probe

pub mod client;
pub mod error;
pub mod location;

pub use client::{ObjectUrlSigner, S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use location::S3Location;
