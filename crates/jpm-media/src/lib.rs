//! Media analysis for transcoding job inputs.
//!
//! This crate provides:
//! - `mediainfo` XML report parsing into [`TechnicalMetadata`]
//! - The [`MediaProbe`] trait and its `mediainfo` process implementation
//! - Job-level input analysis honouring clip ranges

pub mod analysis;
pub mod error;
pub mod mediainfo;
pub mod probe;

pub use analysis::analyze_inputs;
pub use error::{MediaError, MediaResult};
pub use mediainfo::{parse_mediainfo_xml, TechnicalMetadata};
pub use probe::{MediaProbe, MediainfoProbe, ProbeConfig};
