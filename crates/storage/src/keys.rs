//! Timestamp key encoding.
//!
//! Time-keyed collections use fixed-width ISO-8601 UTC strings with
//! microsecond resolution:
//!
//! ```text
//! YYYY-MM-DDTHH:MM:SS.ffffffZ      (27 bytes)
//! 2024-01-01T00:00:00.000000Z
//! ```
//!
//! Every key has the same width, so lexicographic byte order equals
//! chronological order and the engine's ordered range scans are time scans.

use chrono::{DateTime, Utc};
use sensordb_types::timestamp::{check_encodable, truncate_to_micros};
use snafu::ResultExt;

use crate::error::{InvalidTimestampSnafu, Result, StoreError};

/// Length of an encoded timestamp key.
pub const KEY_LEN: usize = 27;

const KEY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Encodes a timestamp as a sortable key, dropping sub-microsecond precision.
///
/// # Errors
///
/// Returns [`StoreError::InvalidTimestamp`] for years outside 0000-9999.
pub fn encode_timestamp(timestamp: DateTime<Utc>) -> Result<String> {
    let timestamp = check_encodable(truncate_to_micros(timestamp)).context(InvalidTimestampSnafu)?;
    Ok(timestamp.format(KEY_FORMAT).to_string())
}

/// Decodes a stored key.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] if the key is not in canonical form.
pub fn decode_timestamp(collection: &str, key: &str) -> Result<DateTime<Utc>> {
    let corrupted = || StoreError::Corrupted {
        message: format!("key {key:?} in {collection} is not a canonical timestamp"),
    };
    if key.len() != KEY_LEN || !key.ends_with('Z') {
        return Err(corrupted());
    }
    let timestamp = DateTime::parse_from_rfc3339(key).map_err(|_| corrupted())?.with_timezone(&Utc);
    if timestamp.format(KEY_FORMAT).to_string() != key {
        return Err(corrupted());
    }
    Ok(timestamp)
}
