//! Job-level input analysis.

use tracing::info;

use jpm_models::{InputAnalysis, InputSettings, JobAnalysis, JobSettings, Timecode};

use crate::error::MediaResult;
use crate::mediainfo::TechnicalMetadata;
use crate::probe::MediaProbe;

/// Probe every input of a job and aggregate the results.
///
/// Inputs with clip ranges count only the clipped frames; several clips on
/// one input are summed. The job codec is the last input's codec.
pub async fn analyze_inputs(probe: &dyn MediaProbe, settings: &JobSettings) -> MediaResult<JobAnalysis> {
    let mut inputs = Vec::with_capacity(settings.inputs.len());

    for input in &settings.inputs {
        let meta = probe.probe(&input.file_input).await?;
        inputs.push(analyze_input(input, &meta)?);
    }

    let analysis = JobAnalysis {
        frame_count: inputs.iter().map(|i| i.frame_count).sum(),
        num_inputs: settings.inputs.len(),
        num_outputs: settings.num_outputs(),
        codec: inputs.last().and_then(|i| i.codec.clone()),
        inputs,
    };

    info!(
        frame_count = analysis.frame_count,
        num_inputs = analysis.num_inputs,
        num_outputs = analysis.num_outputs,
        "Analyzed job inputs"
    );
    Ok(analysis)
}

/// Effective frames and duration of one input.
pub fn analyze_input(input: &InputSettings, meta: &TechnicalMetadata) -> MediaResult<InputAnalysis> {
    let (frame_count, duration) = if input.input_clippings.is_empty() {
        (meta.frame_count, meta.duration)
    } else {
        let mut frames = 0;
        for clip in &input.input_clippings {
            frames += clip_frames(
                clip.start_timecode.as_deref(),
                clip.end_timecode.as_deref(),
                meta,
            )?;
        }
        (frames, frames as f64 / meta.frame_rate)
    };

    Ok(InputAnalysis {
        file_input: input.file_input.clone(),
        frame_rate: meta.frame_rate,
        frame_count,
        duration,
        codec: meta.codec.clone(),
    })
}

/// Frames in a clip. An open start is frame 0, an open end the last frame.
fn clip_frames(start: Option<&str>, end: Option<&str>, meta: &TechnicalMetadata) -> MediaResult<i64> {
    let start: Timecode = start.unwrap_or("00:00:00:00").parse()?;
    match end {
        Some(end) => Ok(Timecode::frames_between(&start, &end.parse()?, meta.frame_rate)?),
        None => {
            let from = start.to_frames(meta.frame_rate)?;
            Ok((meta.frame_count - from).max(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::error::MediaError;

    struct FakeProbe;

    #[async_trait]
    impl MediaProbe for FakeProbe {
        async fn probe(&self, file_input: &str) -> MediaResult<TechnicalMetadata> {
            match file_input {
                "s3://b/a.mp4" => Ok(TechnicalMetadata {
                    frame_rate: 30.0,
                    frame_count: 900,
                    duration: 30.0,
                    codec: Some("AVC".into()),
                }),
                "s3://b/b.mov" => Ok(TechnicalMetadata {
                    frame_rate: 25.0,
                    frame_count: 250,
                    duration: 10.0,
                    codec: Some("ProRes".into()),
                }),
                other => Err(MediaError::probe_failed(
                    format!("cannot open {other}"),
                    Some("404".into()),
                    Some(1),
                )),
            }
        }
    }

    fn settings(value: serde_json::Value) -> JobSettings {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_clip_range_frames() {
        let settings = settings(json!({
            "inputs": [{
                "fileInput": "s3://b/a.mp4",
                "inputClippings": [{"startTimecode": "00:00:01:00", "endTimecode": "00:00:03:00"}]
            }],
            "outputGroups": [{"outputs": [{}]}]
        }));

        let analysis = analyze_inputs(&FakeProbe, &settings).await.unwrap();
        assert_eq!(analysis.frame_count, 60);
        assert_eq!(analysis.inputs[0].duration, 2.0);
        assert_eq!(analysis.num_outputs, 1);
    }

    #[tokio::test]
    async fn test_multiple_inputs_and_clips() {
        let settings = settings(json!({
            "inputs": [
                {"fileInput": "s3://b/a.mp4", "InputClippings": [
                    {"StartTimecode": "00:00:00:00", "EndTimecode": "00:00:01:00"},
                    {"StartTimecode": "00:00:20:00"}
                ]},
                {"fileInput": "s3://b/b.mov"}
            ],
            "outputGroups": [{"outputs": [{}, {}]}, {"outputs": [{}]}]
        }));

        let analysis = analyze_inputs(&FakeProbe, &settings).await.unwrap();
        // 30 + (900 - 600) + 250
        assert_eq!(analysis.frame_count, 580);
        assert_eq!(analysis.num_inputs, 2);
        assert_eq!(analysis.num_outputs, 3);
        assert_eq!(analysis.codec.as_deref(), Some("ProRes"));
        assert_eq!(analysis.inputs[1].duration, 10.0);
    }

    #[tokio::test]
    async fn test_probe_failure_aborts() {
        let settings = settings(json!({"inputs": [{"fileInput": "s3://b/missing.mp4"}]}));
        let err = analyze_inputs(&FakeProbe, &settings).await.unwrap_err();
        assert!(matches!(err, MediaError::ProbeFailed { .. }));
    }

    #[tokio::test]
    async fn test_bad_timecode_is_model_error() {
        let settings = settings(json!({"inputs": [{
            "fileInput": "s3://b/a.mp4",
            "inputClippings": [{"startTimecode": "soon", "endTimecode": "00:00:03:00"}]
        }]}));
        let err = analyze_inputs(&FakeProbe, &settings).await.unwrap_err();
        assert!(matches!(err, MediaError::Model(_)));
    }
}
