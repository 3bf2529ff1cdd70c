//! SMPTE timecodes for input clip ranges.

use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// A `HH:MM:SS:FF` timecode. A `;` before the frame field marks drop-frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    pub drop_frame: bool,
}

impl Timecode {
    /// Absolute frame number at `fps`.
    ///
    /// Drop-frame counting applies only when the timecode is marked
    /// drop-frame and the nominal rate is 30 or 60.
    pub fn to_frames(&self, fps: f64) -> ModelResult<i64> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ModelError::invalid_timecode(format!(
                "{self} at non-positive frame rate {fps}"
            )));
        }

        let nominal = fps.round().max(1.0) as i64;
        if i64::from(self.frames) >= nominal {
            return Err(ModelError::invalid_timecode(format!(
                "{self}: frame field exceeds {nominal} fps"
            )));
        }

        let seconds = i64::from(self.hours) * 3600
            + i64::from(self.minutes) * 60
            + i64::from(self.seconds);
        let frames = seconds * nominal + i64::from(self.frames);

        if self.drop_frame && (nominal == 30 || nominal == 60) {
            let dropped_per_minute = nominal / 15;
            let total_minutes = i64::from(self.hours) * 60 + i64::from(self.minutes);
            Ok(frames - dropped_per_minute * (total_minutes - total_minutes / 10))
        } else {
            Ok(frames)
        }
    }

    /// Frames from `start` up to `end` at `fps`.
    pub fn frames_between(start: &Timecode, end: &Timecode, fps: f64) -> ModelResult<i64> {
        let from = start.to_frames(fps)?;
        let to = end.to_frames(fps)?;
        if to < from {
            return Err(ModelError::invalid_timecode(format!(
                "clip ends ({end}) before it starts ({start})"
            )));
        }
        Ok(to - from)
    }
}

impl FromStr for Timecode {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ModelError::invalid_timecode(s);

        let (head, frames, drop_frame) = match s.rfind([':', ';']) {
            Some(idx) => (&s[..idx], &s[idx + 1..], s[idx..].starts_with(';')),
            None => return Err(invalid()),
        };

        let mut parts = head.split(':');
        let (Some(h), Some(m), Some(sec), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let field = |v: &str| v.parse::<u32>().map_err(|_| invalid());
        let tc = Timecode {
            hours: field(h)?,
            minutes: field(m)?,
            seconds: field(sec)?,
            frames: field(frames)?,
            drop_frame,
        };

        if tc.minutes >= 60 || tc.seconds >= 60 {
            return Err(invalid());
        }
        Ok(tc)
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours, self.minutes, self.seconds, sep, self.frames
        )
    }
}
