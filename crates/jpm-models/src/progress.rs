//! Progress metrics and their derivation.
//!
//! A job's `progressMetrics` holds two kinds of values:
//! - raw counters copied from events (`framesDecoded`, phase progress)
//! - values derived from the raw counters, the event times and the analysis
//!
//! [`derive_progress_metrics`] rebuilds the whole set from those inputs. A
//! derived metric is present only when every input it needs is present.

use serde::{Deserialize, Serialize};

use crate::job::{EventTimes, JobAnalysis};

/// Phase name whose progress mirrors into `percentDecodeComplete`.
pub const TRANSCODING_PHASE: &str = "TRANSCODING";

/// Progress metrics of a job.
///
/// Durations are whole seconds and counters whole frames (`i64`); rates are
/// `f64`. Percentages are whole numbers as reported by the transcoder.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMetrics {
    // ---- raw counters ----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_decoded: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_job_complete: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_phase_percent_complete: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent_decode_complete: Option<i64>,

    // ---- derived ----
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_remaining: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queued_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progressing_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub est_decode_time_remaining: Option<f64>,
}

impl ProgressMetrics {
    /// Numeric entries as `(wire name, value)`, for metric emission.
    ///
    /// `currentPhase` is not numeric and is left out.
    pub fn entries(&self) -> Vec<(&'static str, f64)> {
        let ints = [
            ("framesDecoded", self.frames_decoded),
            ("percentJobComplete", self.percent_job_complete),
            ("currentPhasePercentComplete", self.current_phase_percent_complete),
            ("percentDecodeComplete", self.percent_decode_complete),
            ("frameCount", self.frame_count),
            ("framesRemaining", self.frames_remaining),
            ("queuedDuration", self.queued_duration),
            ("progressingDuration", self.progressing_duration),
            ("statusDuration", self.status_duration),
            ("decodeDuration", self.decode_duration),
        ];
        let floats = [
            ("decodeRate", self.decode_rate),
            ("estDecodeTimeRemaining", self.est_decode_time_remaining),
        ];

        ints.into_iter()
            .filter_map(|(name, v)| v.map(|v| (name, v as f64)))
            .chain(floats.into_iter().filter_map(|(name, v)| v.map(|v| (name, v))))
            .collect()
    }
}

/// Recompute progress metrics from event times, analysis and the raw counters
/// held in `current`.
///
/// Pure: the derived fields of `current` are ignored, so applying this to its
/// own output yields the same value.
pub fn derive_progress_metrics(
    times: &EventTimes,
    analysis: Option<&JobAnalysis>,
    current: &ProgressMetrics,
) -> ProgressMetrics {
    let frames_decoded = current.frames_decoded;
    let frame_count = analysis.map(|a| a.frame_count);

    let frames_remaining = frame_count.zip(frames_decoded).map(|(total, done)| total - done);

    let first = times.first_progressing_time;
    let queued_duration = first.zip(times.create_time).map(|(f, c)| f - c);
    let progressing_duration = times.last_progressing_time.zip(first).map(|(l, f)| l - f);
    let status_duration = times.last_status_time.zip(first).map(|(l, f)| l - f);
    let decode_duration = times.decode_time.zip(first).map(|(d, f)| d - f);

    let decode_rate = frames_decoded
        .zip(status_duration)
        .filter(|(_, secs)| *secs != 0)
        .map(|(frames, secs)| frames as f64 / secs as f64);

    let est_decode_time_remaining = frames_remaining
        .zip(decode_rate)
        .filter(|(_, rate)| *rate > 0.0)
        .map(|(remaining, rate)| remaining as f64 / rate);

    ProgressMetrics {
        frames_decoded,
        percent_job_complete: current.percent_job_complete,
        current_phase: current.current_phase.clone(),
        current_phase_percent_complete: current.current_phase_percent_complete,
        percent_decode_complete: current.percent_decode_complete,
        frame_count,
        frames_remaining,
        queued_duration,
        progressing_duration,
        status_duration,
        decode_duration,
        decode_rate,
        est_decode_time_remaining,
    }
}
