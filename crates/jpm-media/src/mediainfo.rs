//! `mediainfo --Full --Output=XML` report parsing.
//!
//! Two report layouts exist in the wild:
//! - current: `<MediaInfo><media><track type="General"><FrameRate>` with
//!   durations in seconds
//! - legacy: `<Mediainfo><File><track type="General"><Frame_rate>` with
//!   durations in milliseconds
//!
//! With `--Full` a field may repeat in several renderings (`29.970`,
//! `29.970 FPS`); the first occurrence is the raw value.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// Technical metadata of one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalMetadata {
    pub frame_rate: f64,
    pub frame_count: i64,
    /// Seconds
    pub duration: f64,
    pub codec: Option<String>,
}

#[derive(Debug, Default)]
struct Track {
    kind: String,
    fields: HashMap<String, String>,
}

impl Track {
    fn first(&self, names: &[&str]) -> Option<&str> {
        names
            .iter()
            .find_map(|n| self.fields.get(*n))
            .map(String::as_str)
    }
}

/// Parse a mediainfo XML report.
///
/// Values come from the General track, falling back to the first Video track.
pub fn parse_mediainfo_xml(xml: &str) -> MediaResult<TechnicalMetadata> {
    let (tracks, legacy) = read_tracks(xml)?;

    let general = tracks.iter().find(|t| t.kind == "General");
    let video = tracks.iter().find(|t| t.kind == "Video");
    let find = |names: &[&str]| lookup(general, video, names);

    let frame_rate = find(&["FrameRate", "Frame_rate"])
        .and_then(leading_number)
        .filter(|fps| *fps > 0.0)
        .ok_or_else(|| MediaError::invalid_output("no frame rate in report"))?;

    let duration = find(&["Duration"])
        .and_then(leading_number)
        .map(|d| if legacy { d / 1000.0 } else { d });

    let frame_count = match find(&["FrameCount", "Frame_count"]).and_then(leading_number) {
        Some(count) => count as i64,
        None => duration
            .map(|d| (d * frame_rate).round() as i64)
            .ok_or_else(|| MediaError::invalid_output("no frame count or duration in report"))?,
    };

    let codec = general
        .and_then(|t| t.first(&["Video_Format_List"]))
        .or_else(|| video.and_then(|t| t.first(&["Format"])))
        .map(str::to_string);

    Ok(TechnicalMetadata {
        frame_rate,
        frame_count,
        duration: duration.unwrap_or(frame_count as f64 / frame_rate),
        codec,
    })
}

fn lookup<'a>(general: Option<&'a Track>, video: Option<&'a Track>, names: &[&str]) -> Option<&'a str> {
    general
        .and_then(|t| t.first(names))
        .or_else(|| video.and_then(|t| t.first(names)))
}

/// Collect the direct children of every `<track>`. Returns the tracks and
/// whether the report uses the legacy layout.
fn read_tracks(xml: &str) -> MediaResult<(Vec<Track>, bool)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut tracks = Vec::new();
    let mut legacy = false;
    let mut current: Option<Track> = None;
    // depth below the open <track>; 1 = direct child
    let mut depth = 0usize;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if current.is_some() {
                    depth += 1;
                    field = (depth == 1).then_some(name);
                } else if name == "track" {
                    let kind = match e.try_get_attribute("type") {
                        Ok(Some(attr)) => attr
                            .unescape_value()
                            .map(|v| v.into_owned())
                            .unwrap_or_default(),
                        _ => String::new(),
                    };
                    current = Some(Track {
                        kind,
                        ..Default::default()
                    });
                    depth = 0;
                } else if name == "Mediainfo" || name == "File" {
                    legacy = true;
                }
            }
            Ok(Event::Text(t)) => {
                if let (Some(track), Some(name)) = (current.as_mut(), field.as_ref()) {
                    let text = t
                        .unescape()
                        .map_err(|e| MediaError::invalid_output(format!("bad XML text: {e}")))?;
                    track
                        .fields
                        .entry(name.clone())
                        .or_insert_with(|| text.into_owned());
                }
            }
            Ok(Event::End(_)) => {
                if current.is_some() {
                    if depth == 0 {
                        tracks.extend(current.take());
                    } else {
                        depth -= 1;
                        field = None;
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(MediaError::invalid_output(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    if tracks.is_empty() {
        return Err(MediaError::invalid_output("report has no tracks"));
    }
    Ok((tracks, legacy))
}

/// Numeric prefix of a field value (`"29.970 FPS"` -> 29.97).
fn leading_number(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(value.len());
    value[..end].parse().ok()
}
