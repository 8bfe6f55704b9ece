//! Core data structures: readings and time ranges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp::{TimestampError, parse_timestamp, truncate_to_micros};

/// A single sensor measurement.
///
/// Values compare bit-for-bit in the store, so `NaN` and infinities survive a
/// round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Instant of the measurement, UTC with microsecond resolution.
    pub timestamp: DateTime<Utc>,
    /// Measured value.
    pub value: f64,
}

impl Reading {
    /// Creates a reading, truncating the timestamp to microseconds.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp: truncate_to_micros(timestamp), value }
    }

    /// Bitwise equality, treating identical `NaN` payloads as equal.
    #[must_use]
    pub fn bit_eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.value.to_bits() == other.value.to_bits()
    }
}

/// Half-open time interval `[since, until)`.
///
/// A missing bound is unbounded on that side. Every range query, range
/// delete and note scan in sensordb uses this convention: `since` is
/// inclusive, `until` is exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// The unbounded range covering every timestamp.
    #[must_use]
    pub const fn all() -> Self {
        Self { since: None, until: None }
    }

    /// `[since, until)`.
    #[must_use]
    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self { since: Some(truncate_to_micros(since)), until: Some(truncate_to_micros(until)) }
    }

    /// `[since, ∞)`.
    #[must_use]
    pub fn since(since: DateTime<Utc>) -> Self {
        Self { since: Some(truncate_to_micros(since)), until: None }
    }

    /// `(-∞, until)`.
    #[must_use]
    pub fn until(until: DateTime<Utc>) -> Self {
        Self { since: None, until: Some(truncate_to_micros(until)) }
    }

    /// Builds a range from optional textual bounds, as received from query
    /// strings or command lines.
    ///
    /// # Errors
    ///
    /// Returns a [`TimestampError`] if either bound fails to parse.
    pub fn parse(since: Option<&str>, until: Option<&str>) -> Result<Self, TimestampError> {
        Ok(Self {
            since: since.map(parse_timestamp).transpose()?,
            until: until.map(parse_timestamp).transpose()?,
        })
    }

    /// Whether `since` lies after `until`.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        matches!((self.since, self.until), (Some(since), Some(until)) if since > until)
    }

    /// Whether the range cannot contain any timestamp.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!((self.since, self.until), (Some(since), Some(until)) if since >= until)
    }

    /// Whether `timestamp` falls inside the range.
    #[must_use]
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.since.is_none_or(|since| *timestamp >= since)
            && self.until.is_none_or(|until| *timestamp < until)
    }
}
