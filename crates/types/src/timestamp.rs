//! Timestamp parsing and normalization.
//!
//! Every timestamp that reaches the store is a UTC instant with microsecond
//! resolution. Inputs are accepted as:
//!
//! - RFC 3339 with an explicit offset (`2024-01-01T01:00:00+01:00`, `...Z`),
//!   normalized to UTC
//! - Epoch numbers, optionally suffixed with a unit: `s` (default), `ms`,
//!   `us`, `ns` (`1704067200`, `1704067200000ms`, `1704067200.5s`)
//!
//! Date-times without a timezone are rejected as ambiguous rather than being
//! interpreted in the local zone.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SubsecRound, Utc};
use snafu::Snafu;

/// Error returned when a timestamp cannot be turned into a UTC instant.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum TimestampError {
    /// The input is empty or not a recognized timestamp format.
    #[snafu(display("unparseable timestamp {input:?}"))]
    Unparseable {
        /// Offending input.
        input: String,
    },

    /// The input is a date or date-time without timezone information.
    #[snafu(display("timestamp {input:?} has no timezone"))]
    Ambiguous {
        /// Offending input.
        input: String,
    },

    /// The instant cannot be represented by the fixed-width key encoding.
    #[snafu(display("timestamp {input:?} is outside years 0000-9999"))]
    OutOfRange {
        /// Offending input.
        input: String,
    },
}

/// Largest year that still encodes to a four-digit, fixed-width key.
pub const MAX_YEAR: i32 = 9999;

/// Parses a timestamp string into a UTC instant truncated to microseconds.
///
/// # Errors
///
/// Returns [`TimestampError::Ambiguous`] for date-times without timezone,
/// [`TimestampError::OutOfRange`] for years outside 0000-9999, and
/// [`TimestampError::Unparseable`] for anything else that is not a timestamp.
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return UnparseableSnafu { input }.fail();
    }

    if let Some(parsed) = parse_epoch(trimmed) {
        return parsed.ok_or_else(|| TimestampError::OutOfRange { input: input.to_string() });
    }

    let with_offset = DateTime::parse_from_rfc3339(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%z"));
    if let Ok(parsed) = with_offset {
        let utc = truncate_to_micros(parsed.with_timezone(&Utc));
        return check_range(utc, input);
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok();
    if naive {
        return AmbiguousSnafu { input }.fail();
    }

    UnparseableSnafu { input }.fail()
}

/// Drops sub-microsecond precision.
#[must_use]
pub fn truncate_to_micros(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(6)
}

/// Ensures the instant fits the four-digit year of the key encoding.
///
/// # Errors
///
/// Returns [`TimestampError::OutOfRange`] when the year is negative or above
/// [`MAX_YEAR`].
pub fn check_encodable(timestamp: DateTime<Utc>) -> Result<DateTime<Utc>, TimestampError> {
    check_range(timestamp, &timestamp.to_rfc3339())
}

fn check_range(timestamp: DateTime<Utc>, input: &str) -> Result<DateTime<Utc>, TimestampError> {
    use chrono::Datelike;

    if (0..=MAX_YEAR).contains(&timestamp.year()) {
        Ok(timestamp)
    } else {
        OutOfRangeSnafu { input }.fail()
    }
}

/// Parses epoch input. Returns `None` when the input is not numeric at all and
/// `Some(None)` when it is numeric but out of range.
fn parse_epoch(input: &str) -> Option<Option<DateTime<Utc>>> {
    let (number, micros_per_unit): (&str, f64) = if let Some(n) = input.strip_suffix("ns") {
        (n, 1e-3)
    } else if let Some(n) = input.strip_suffix("us") {
        (n, 1.0)
    } else if let Some(n) = input.strip_suffix("ms") {
        (n, 1e3)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1e6)
    } else {
        (input, 1e6)
    };

    let micros = if let Ok(integer) = number.parse::<i64>() {
        let micros = i128::from(integer) * (micros_per_unit * 1e3) as i128 / 1000;
        i64::try_from(micros).ok()
    } else if let Ok(float) = number.parse::<f64>() {
        if !float.is_finite() {
            return None;
        }
        let micros = (float * micros_per_unit).trunc();
        (micros.abs() < i64::MAX as f64).then_some(micros as i64)
    } else {
        return None;
    };

    Some(
        micros
            .and_then(DateTime::from_timestamp_micros)
            .and_then(|t| check_range(t, input).ok()),
    )
}
