//! Event timestamp normalization.
//!
//! Lifecycle events carry times in several shapes:
//! - RFC 3339 strings such as `2019-09-10T15:30:26Z` (event envelopes)
//! - epoch seconds as integers or floats (`createdAt` of the creation call)
//! - epoch milliseconds from some producers
//!
//! Everything is normalized to integer epoch seconds.

use chrono::DateTime;
use serde_json::Value;

use crate::error::{ModelError, ModelResult};

/// Values at or above this are taken to be epoch milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// 9999-12-31T23:59:59Z
const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

/// Normalize a JSON timestamp value to epoch seconds.
///
/// # Examples
/// ```
/// use jpm_models::timestamp::epoch_seconds;
/// use serde_json::json;
/// assert_eq!(epoch_seconds(&json!("1970-01-01T00:01:40Z")).unwrap(), 100);
/// assert_eq!(epoch_seconds(&json!(100)).unwrap(), 100);
/// assert_eq!(epoch_seconds(&json!(100_000_000_000_i64)).unwrap(), 100_000_000);
/// ```
pub fn epoch_seconds(value: &Value) -> ModelResult<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                from_integer(i)
            } else if let Some(f) = n.as_f64() {
                from_integer(f.trunc() as i64)
            } else {
                Err(ModelError::invalid_timestamp(n.to_string()))
            }
        }
        Value::String(s) => parse_timestamp_str(s),
        other => Err(ModelError::invalid_timestamp(other.to_string())),
    }
}

/// Parse a timestamp string: RFC 3339 or a plain epoch number.
pub fn parse_timestamp_str(s: &str) -> ModelResult<i64> {
    let s = s.trim();
    if s.is_empty() {
        return Err(ModelError::invalid_timestamp("empty timestamp"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return in_range(dt.timestamp());
    }

    if let Ok(i) = s.parse::<i64>() {
        return from_integer(i);
    }

    match s.parse::<f64>() {
        Ok(f) if f.is_finite() => from_integer(f.trunc() as i64),
        _ => Err(ModelError::invalid_timestamp(s)),
    }
}

fn from_integer(i: i64) -> ModelResult<i64> {
    if i.unsigned_abs() >= MILLIS_THRESHOLD {
        in_range(i / 1000)
    } else {
        in_range(i)
    }
}

/// Times before the epoch or after year 9999 are rejected.
fn in_range(secs: i64) -> ModelResult<i64> {
    if (0..=MAX_EPOCH_SECONDS).contains(&secs) {
        Ok(secs)
    } else {
        Err(ModelError::invalid_timestamp(format!("{secs} is out of range")))
    }
}
