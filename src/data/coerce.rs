//! Coercion of raw provider values into plottable numbers.
//!
//! Failed coercions return `None`; callers drop the row silently.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::provider::RawValue;
use crate::constants::datetime::*;

/// Coerce a value to a finite number. Text is trimmed and parsed.
pub fn coerce_number(value: &RawValue) -> Option<f64> {
    let n = match value {
        RawValue::Number(n) => *n,
        RawValue::Text(s) => s.trim().parse::<f64>().ok()?,
    };
    n.is_finite().then_some(n)
}

/// Coerce a value to a UTC timestamp in milliseconds since the Unix epoch.
///
/// Numbers are epoch seconds, or epoch milliseconds when at or above
/// [`EPOCH_MILLIS_THRESHOLD`]. Text may be a number, RFC 3339, a compact
/// `YYYYMMDD HHMMSS` stamp, or one of the common date/time layouts below
/// (interpreted as UTC).
pub fn coerce_timestamp(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) => epoch_to_millis(*n),
        RawValue::Text(s) => parse_timestamp(s),
    }
}

fn epoch_to_millis(n: f64) -> Option<f64> {
    if !n.is_finite() {
        return None;
    }
    if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        Some(n)
    } else {
        Some(n * 1000.0)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f", // 2024-01-15T14:30:00.123
    "%Y-%m-%dT%H:%M:%S",    // 2024-01-15T14:30:00
    "%Y-%m-%dT%H:%M",       // 2024-01-15T14:30
    "%Y-%m-%d %H:%M:%S%.f", // 2024-01-15 14:30:00.123
    "%Y-%m-%d %H:%M:%S",    // 2024-01-15 14:30:00
    "%Y-%m-%d %H:%M",       // 2024-01-15 14:30
    "%Y/%m/%d %H:%M:%S",    // 2024/01/15 14:30:00
    "%d/%m/%Y %H:%M:%S",    // 15/01/2024 14:30:00
    "%d-%m-%Y %H:%M:%S",    // 15-01-2024 14:30:00
    "%b %d, %Y %H:%M:%S",   // Jan 15, 2024 14:30:00
    "%d %b %Y %H:%M:%S",    // 15 Jan 2024 14:30:00
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",   // 2024-01-15
    "%Y/%m/%d",   // 2024/01/15
    "%d/%m/%Y",   // 15/01/2024
    "%d-%m-%Y",   // 15-01-2024
    "%b %d, %Y",  // Jan 15, 2024
    "%d %b %Y",   // 15 Jan 2024
];

fn parse_timestamp(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(num) = trimmed.parse::<f64>() {
        return epoch_to_millis(num);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_millis() as f64);
    }

    if let Some(ms) = parse_compact(trimmed) {
        return Some(ms);
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.and_utc().timestamp_millis() as f64);
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis() as f64);
        }
    }

    None
}

/// YYYYMMDD HHMMSS
fn parse_compact(s: &str) -> Option<f64> {
    if s.len() < MIN_TIMESTAMP_LENGTH {
        return None;
    }
    let (date, time) = s.split_once(char::is_whitespace)?;
    let time = time.trim();
    if date.len() != DATE_FORMAT_LENGTH
        || time.len() != TIME_FORMAT_LENGTH
        || !date.chars().chain(time.chars()).all(|c| c.is_ascii_digit())
    {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis() as f64)
}
