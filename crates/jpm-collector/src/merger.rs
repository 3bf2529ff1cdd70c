//! Job state merging.
//!
//! Events for one job arrive out of order and possibly more than once. Every
//! merge step is monotonic: `lastTime` and `framesDecoded` only grow, and a
//! job never leaves COMPLETE or ERROR for PROGRESSING.

use jpm_models::{
    CreateJobEvent, Job, JobAnalysis, JobStatus, MetricContext, StateChangeEvent, StatusUpdate,
};
use jpm_models::progress::TRANSCODING_PHASE;

/// Merges classified events into the stored job record.
#[derive(Debug, Clone, Copy, Default)]
pub struct JobStateMerger;

impl JobStateMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge a creation event carrying the job's input `analysis`.
    pub fn merge_creation(
        &self,
        existing: Option<Job>,
        event: &CreateJobEvent,
        analysis: JobAnalysis,
    ) -> Job {
        let ts = event.timestamp;
        let payload = &event.payload;

        let mut job = Job::synthesize(
            payload.id.clone(),
            payload.queue.clone(),
            payload.user_metadata.clone(),
            ts,
        );
        job.status = Some(payload.status);
        job.event_status = Some(payload.status);
        job.settings = Some(payload.settings.clone());
        job.created_at = Some(ts);
        job.analysis = Some(analysis);
        job.extra = payload.extra.clone();

        if let Some(prev) = existing {
            job.event_times = prev.event_times;
            job.event_times.advance(ts);
            job.progress_metrics = prev.progress_metrics;
            job.input_details = prev.input_details;
            if let Some(status) = prev.status {
                job.status = Some(status);
                if status.is_terminal() {
                    job.event_status = prev.event_status.or(Some(status));
                }
            }
        }
        job.event_times.create_time = Some(ts);

        if payload.status == JobStatus::Progressing {
            let times = &mut job.event_times;
            times.first_progressing_time = Some(times.first_progressing_time.map_or(ts, |t| t.min(ts)));
        }

        if job.is_complete() {
            let frame_count = job.frame_count();
            let metrics = &mut job.progress_metrics;
            if frame_count.is_some() {
                metrics.frames_decoded = frame_count;
            }
            metrics.percent_decode_complete = Some(100);
            metrics.percent_job_complete = Some(100);
            metrics.current_phase = None;
        }

        job.filters = MetricContext::for_job(&job).filters;
        job.recompute_metrics();
        job
    }

    /// Merge a state-change event, synthesizing the job if it is unknown.
    pub fn merge_state_change(&self, existing: Option<Job>, event: &StateChangeEvent) -> Job {
        let ts = event.timestamp;
        let detail = &event.detail;

        let mut job = existing.unwrap_or_else(|| {
            Job::synthesize(
                detail.job_id.clone(),
                detail.queue.clone(),
                detail.user_metadata.clone(),
                ts,
            )
        });
        job.event_times.advance(ts);

        match &detail.update {
            StatusUpdate::Submitted => {}
            StatusUpdate::Progressing => apply_progressing(&mut job, ts),
            StatusUpdate::StatusUpdate {
                frames_decoded,
                job_percent_complete,
                current_phase,
                phase_percent_complete,
            } => {
                if !job.is_complete() {
                    job.event_status = Some(JobStatus::Progressing);

                    let times = &mut job.event_times;
                    times.last_status_time = Some(times.last_status_time.map_or(ts, |t| t.max(ts)));

                    let metrics = &mut job.progress_metrics;
                    metrics.frames_decoded =
                        Some(metrics.frames_decoded.map_or(*frames_decoded, |f| f.max(*frames_decoded)));
                    metrics.percent_job_complete = Some(*job_percent_complete);
                    metrics.current_phase = Some(current_phase.clone());
                    metrics.current_phase_percent_complete = *phase_percent_complete;

                    if current_phase == TRANSCODING_PHASE {
                        if let Some(percent) = phase_percent_complete {
                            metrics.percent_decode_complete = Some(*percent);
                            if *percent >= 100 && times.decode_time.is_none() {
                                times.decode_time = Some(ts);
                            }
                        }
                    }
                }
            }
            StatusUpdate::InputInformation(details) => {
                job.input_details = Some(details.clone());
            }
            StatusUpdate::Complete => {
                job.status = Some(JobStatus::Complete);
                job.event_status = Some(JobStatus::Complete);

                let times = &mut job.event_times;
                times.complete_time = Some(ts);
                times.last_progressing_time = Some(ts);
                times.last_status_time = Some(ts);

                let frame_count = job.frame_count();
                let metrics = &mut job.progress_metrics;
                if frame_count.is_some() {
                    metrics.frames_decoded = frame_count;
                }
                metrics.percent_decode_complete = Some(100);
                metrics.percent_job_complete = Some(100);
                metrics.current_phase = None;
                metrics.current_phase_percent_complete = None;
            }
            StatusUpdate::Error { .. } => {
                job.status = Some(JobStatus::Error);
                job.event_status = Some(JobStatus::Error);
                job.event_times.error_time = Some(ts);
            }
        }

        job.recompute_metrics();
        job
    }
}

/// Ignored on COMPLETE and ERROR jobs, `eventStatus` included.
fn apply_progressing(job: &mut Job, ts: i64) {
    match job.status {
        Some(status) if status.is_terminal() => return,
        Some(JobStatus::Progressing) => {}
        _ => job.status = Some(JobStatus::Progressing),
    }
    job.event_status = Some(JobStatus::Progressing);

    // the progressing window only widens
    let times = &mut job.event_times;
    times.first_progressing_time = Some(times.first_progressing_time.map_or(ts, |t| t.min(ts)));
    times.last_progressing_time = Some(times.last_progressing_time.map_or(ts, |t| t.max(ts)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use jpm_models::{CreateJobPayload, JobId, JobSettings, StateChangeDetail};
    use proptest::prelude::*;
    use serde_json::{json, Map};
    use std::collections::BTreeMap;

    const QUEUE: &str = "arn:aws:mediaconvert:us-west-2:123456789012:queues/Default";

    fn state_change(ts: i64, update: StatusUpdate) -> StateChangeEvent {
        StateChangeEvent {
            timestamp: ts,
            detail: StateChangeDetail {
                job_id: JobId::from_string("job-1"),
                queue: QUEUE.to_string(),
                user_metadata: BTreeMap::from([("app".to_string(), "vod".to_string())]),
                update,
            },
        }
    }

    fn status_update(ts: i64, frames: i64, percent: i64) -> StateChangeEvent {
        state_change(
            ts,
            StatusUpdate::StatusUpdate {
                frames_decoded: frames,
                job_percent_complete: percent,
                current_phase: TRANSCODING_PHASE.to_string(),
                phase_percent_complete: Some(percent),
            },
        )
    }

    fn creation(ts: i64, status: JobStatus) -> CreateJobEvent {
        CreateJobEvent {
            timestamp: ts,
            payload: CreateJobPayload {
                id: JobId::from_string("job-1"),
                status,
                queue: QUEUE.to_string(),
                user_metadata: BTreeMap::from([("app".to_string(), "vod".to_string())]),
                settings: JobSettings::default(),
                created_at: Some(json!(ts)),
                extra: Map::new(),
            },
        }
    }

    fn analysis(frame_count: i64) -> JobAnalysis {
        JobAnalysis {
            frame_count,
            num_inputs: 1,
            num_outputs: 2,
            codec: Some("AVC".into()),
            inputs: Vec::new(),
        }
    }

    fn apply(job: Option<Job>, event: &StateChangeEvent) -> Job {
        JobStateMerger::new().merge_state_change(job, event)
    }

    #[test]
    fn test_creation_without_record() {
        let job = JobStateMerger::new().merge_creation(None, &creation(100, JobStatus::Submitted), analysis(1000));

        assert_eq!(job.status, Some(JobStatus::Submitted));
        assert_eq!(job.event_times.create_time, Some(100));
        assert_eq!(job.event_times.last_time, 100);
        assert_eq!(job.progress_metrics.frame_count, Some(1000));
        assert_eq!(job.filters["account"], "123456789012");
        assert_eq!(job.filters["region"], "us-west-2");
        assert_eq!(job.filters["queueName"], "Default");
        assert_eq!(job.filters["app"], "vod");
    }

    #[test]
    fn test_creation_after_status_updates_keeps_times_and_status() {
        let mut job = apply(None, &state_change(110, StatusUpdate::Progressing));
        job = apply(Some(job), &status_update(120, 100, 10));
        job = apply(Some(job), &status_update(130, 200, 20));

        let merged = JobStateMerger::new().merge_creation(Some(job), &creation(100, JobStatus::Submitted), analysis(1000));

        assert_eq!(merged.status, Some(JobStatus::Progressing));
        assert_eq!(merged.event_times.create_time, Some(100));
        assert_eq!(merged.event_times.first_progressing_time, Some(110));
        assert_eq!(merged.event_times.last_status_time, Some(130));
        assert_eq!(merged.event_times.last_time, 130);
        assert_eq!(merged.progress_metrics.frames_decoded, Some(200));
        assert_eq!(merged.progress_metrics.frames_remaining, Some(800));
        assert_eq!(merged.progress_metrics.queued_duration, Some(10));
    }

    #[test]
    fn test_creation_with_progressing_status() {
        let job = JobStateMerger::new().merge_creation(None, &creation(100, JobStatus::Progressing), analysis(10));
        assert_eq!(job.event_times.first_progressing_time, Some(100));
        assert_eq!(job.progress_metrics.queued_duration, Some(0));
    }

    #[test]
    fn test_creation_after_complete_forces_frame_count() {
        let job = apply(None, &state_change(200, StatusUpdate::Complete));
        let merged = JobStateMerger::new().merge_creation(Some(job), &creation(100, JobStatus::Submitted), analysis(1000));

        assert_eq!(merged.status, Some(JobStatus::Complete));
        assert_eq!(merged.event_status, Some(JobStatus::Complete));
        assert_eq!(merged.progress_metrics.frames_decoded, Some(1000));
        assert_eq!(merged.progress_metrics.frames_remaining, Some(0));
        assert_eq!(merged.progress_metrics.percent_job_complete, Some(100));
        assert_eq!(merged.progress_metrics.percent_decode_complete, Some(100));
    }

    #[test]
    fn test_state_change_synthesizes_job() {
        let job = apply(None, &status_update(150, 50, 5));
        assert_eq!(job.id.as_str(), "job-1");
        assert_eq!(job.queue_name.as_deref(), Some("Default"));
        assert_eq!(job.user_metadata["app"], "vod");
        assert_eq!(job.status, None);
        assert_eq!(job.event_status, Some(JobStatus::Progressing));
        assert_eq!(job.progress_metrics.percent_decode_complete, Some(5));
    }

    #[test]
    fn test_status_update_rates() {
        let mut job = apply(None, &state_change(100, StatusUpdate::Progressing));
        job.analysis = Some(analysis(100));
        let job = apply(Some(job), &status_update(150, 50, 50));

        assert_eq!(job.progress_metrics.status_duration, Some(50));
        assert_eq!(job.progress_metrics.decode_rate, Some(1.0));
        assert_eq!(job.progress_metrics.frames_remaining, Some(50));
        assert_eq!(job.progress_metrics.est_decode_time_remaining, Some(50.0));
    }

    #[test]
    fn test_decode_time_latches_once() {
        let mut job = apply(None, &state_change(100, StatusUpdate::Progressing));
        job = apply(Some(job), &status_update(140, 900, 100));
        job = apply(Some(job), &status_update(160, 1000, 100));

        assert_eq!(job.event_times.decode_time, Some(140));
        assert_eq!(job.progress_metrics.decode_duration, Some(40));
    }

    #[test]
    fn test_other_phase_does_not_touch_decode_progress() {
        let event = state_change(
            100,
            StatusUpdate::StatusUpdate {
                frames_decoded: 10,
                job_percent_complete: 3,
                current_phase: "PROBING".into(),
                phase_percent_complete: Some(100),
            },
        );
        let job = apply(None, &event);
        assert_eq!(job.progress_metrics.current_phase.as_deref(), Some("PROBING"));
        assert_eq!(job.progress_metrics.current_phase_percent_complete, Some(100));
        assert_eq!(job.progress_metrics.percent_decode_complete, None);
        assert_eq!(job.event_times.decode_time, None);
    }

    #[test]
    fn test_complete_sets_percentages() {
        let mut job = apply(None, &status_update(100, 50, 40));
        job.analysis = Some(analysis(500));
        let job = apply(Some(job), &state_change(200, StatusUpdate::Complete));

        assert_eq!(job.status, Some(JobStatus::Complete));
        assert_eq!(job.event_times.complete_time, Some(200));
        assert_eq!(job.event_times.last_status_time, Some(200));
        assert_eq!(job.progress_metrics.frames_decoded, Some(500));
        assert_eq!(job.progress_metrics.percent_decode_complete, Some(100));
        assert_eq!(job.progress_metrics.percent_job_complete, Some(100));
        assert_eq!(job.progress_metrics.current_phase, None);
    }

    #[test]
    fn test_status_update_after_complete_is_ignored() {
        let job = apply(None, &status_update(100, 500, 90));
        let job = apply(Some(job), &state_change(200, StatusUpdate::Complete));
        let after = apply(Some(job.clone()), &status_update(300, 900, 95));

        assert_eq!(after.status, Some(JobStatus::Complete));
        assert_eq!(after.progress_metrics.frames_decoded, job.progress_metrics.frames_decoded);
        assert_eq!(after.event_times.last_time, 300);
    }

    #[test]
    fn test_progressing_never_regresses_terminal_status() {
        let job = apply(None, &state_change(200, StatusUpdate::Complete));
        let job = apply(Some(job), &state_change(100, StatusUpdate::Progressing));
        assert_eq!(job.status, Some(JobStatus::Complete));
        assert_eq!(job.event_status, Some(JobStatus::Complete));
        assert_eq!(job.event_times.first_progressing_time, None);

        let job = apply(None, &state_change(200, StatusUpdate::Error {
            error_code: Some(json!(1010)),
            error_message: Some("bad input".into()),
        }));
        let job = apply(Some(job), &state_change(210, StatusUpdate::Progressing));
        assert_eq!(job.status, Some(JobStatus::Error));
        assert_eq!(job.event_status, Some(JobStatus::Error));
        assert_eq!(job.event_times.error_time, Some(200));
        assert_eq!(job.event_times.last_time, 210);
    }

    #[test]
    fn test_error_after_complete_marks_job_failed() {
        let job = apply(None, &state_change(100, StatusUpdate::Complete));
        let job = apply(Some(job), &state_change(200, StatusUpdate::Error {
            error_code: Some(json!(1401)),
            error_message: Some("output write failed".into()),
        }));

        assert_eq!(job.status, Some(JobStatus::Error));
        assert_eq!(job.event_status, Some(JobStatus::Error));
        assert_eq!(job.event_times.error_time, Some(200));
        assert_eq!(job.event_times.complete_time, Some(100));
    }

    #[test]
    fn test_status_update_after_error_reports_progressing() {
        let job = apply(None, &state_change(100, StatusUpdate::Error {
            error_code: None,
            error_message: None,
        }));
        let job = apply(Some(job), &status_update(150, 40, 20));

        assert_eq!(job.status, Some(JobStatus::Error));
        assert_eq!(job.event_status, Some(JobStatus::Progressing));
        assert_eq!(job.progress_metrics.frames_decoded, Some(40));
        assert_eq!(job.event_times.last_status_time, Some(150));
    }

    #[test]
    fn test_repeated_progressing_widens_window() {
        let job = apply(None, &state_change(150, StatusUpdate::Progressing));
        let job = apply(Some(job), &state_change(100, StatusUpdate::Progressing));
        let job = apply(Some(job), &state_change(180, StatusUpdate::Progressing));

        assert_eq!(job.event_times.first_progressing_time, Some(100));
        assert_eq!(job.event_times.last_progressing_time, Some(180));
        assert_eq!(job.progress_metrics.progressing_duration, Some(80));
    }

    #[test]
    fn test_input_information_is_carried() {
        let details = json!([{"id": 1, "uri": "s3://b/in.mp4", "video": [{"width": 1920}]}]);
        let job = apply(None, &state_change(100, StatusUpdate::InputInformation(details.clone())));
        let job = apply(Some(job), &status_update(110, 10, 1));
        assert_eq!(job.input_details, Some(details));
    }

    #[test]
    fn test_submitted_only_advances_last_time() {
        let job = apply(None, &status_update(100, 10, 1));
        let before = job.clone();
        let job = apply(Some(job), &state_change(120, StatusUpdate::Submitted));

        assert_eq!(job.event_times.last_time, 120);
        assert_eq!(job.status, before.status);
        assert_eq!(job.event_status, before.event_status);
        assert_eq!(job.progress_metrics.frames_decoded, Some(10));
    }

    fn arb_update() -> impl Strategy<Value = StatusUpdate> {
        prop_oneof![
            Just(StatusUpdate::Submitted),
            Just(StatusUpdate::Progressing),
            Just(StatusUpdate::Complete),
            Just(StatusUpdate::Error { error_code: None, error_message: None }),
            Just(StatusUpdate::InputInformation(json!({}))),
            (0i64..100_000, 0i64..=100).prop_map(|(frames, percent)| StatusUpdate::StatusUpdate {
                frames_decoded: frames,
                job_percent_complete: percent,
                current_phase: TRANSCODING_PHASE.to_string(),
                phase_percent_complete: Some(percent),
            }),
        ]
    }

    proptest! {
        #[test]
        fn frames_decoded_is_max_in_any_order(
            updates in proptest::collection::vec((0i64..1_000_000, 0i64..100_000), 1..20)
        ) {
            let mut job: Option<Job> = None;
            for (ts, frames) in &updates {
                job = Some(apply(job, &status_update(*ts, *frames, 10)));
            }
            let job = job.unwrap();
            let max_frames = updates.iter().map(|(_, f)| *f).max();
            let max_ts = updates.iter().map(|(t, _)| *t).max().unwrap();
            prop_assert_eq!(job.progress_metrics.frames_decoded, max_frames);
            prop_assert_eq!(job.event_times.last_status_time, Some(max_ts));
        }

        #[test]
        fn last_time_is_monotonic(
            events in proptest::collection::vec((0i64..1_000_000, arb_update()), 1..30)
        ) {
            let mut job: Option<Job> = None;
            let mut previous = i64::MIN;
            for (ts, update) in events.iter().cloned() {
                let next = apply(job, &state_change(ts, update));
                prop_assert!(next.event_times.last_time >= previous);
                prop_assert_eq!(next.event_times.latest_recorded(), next.event_times.last_time);
                previous = next.event_times.last_time;
                job = Some(next);
            }
            let max_ts = events.iter().map(|(t, _)| *t).max().unwrap();
            prop_assert_eq!(previous, max_ts);
        }

        #[test]
        fn terminal_status_never_returns_to_progressing(
            events in proptest::collection::vec((0i64..1_000_000, arb_update()), 1..30)
        ) {
            let mut job: Option<Job> = None;
            let mut terminal = false;
            for (ts, update) in events.iter().cloned() {
                let next = apply(job, &state_change(ts, update));
                if terminal {
                    prop_assert!(next.status.is_some_and(|s| s.is_terminal()));
                }
                terminal = next.status.is_some_and(|s| s.is_terminal());
                job = Some(next);
            }
        }
    }
}
