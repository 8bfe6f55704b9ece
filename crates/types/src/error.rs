//! Machine-readable error codes shared across sensordb crates.
//!
//! Each error variant of the storage layer maps to an [`ErrorCode`] with a
//! unique numeric identifier, a retryability classification, and a suggested
//! recovery action. Codes are organized into ranges:
//!
//! | Range       | Domain      | Examples                                   |
//! |-------------|-------------|--------------------------------------------|
//! | 1000–1099   | Storage     | Store open, lock, transaction, table ops   |
//! | 1100–1199   | Storage I/O | Corruption                                 |
//! | 3000–3099   | Input       | Timestamp, sensor name, time range         |
//! | 3100–3199   | Lookup      | Not found, empty collection, unknown sensor|
//! | 3200–3299   | Content     | Malformed metadata, serialization          |
//! | 3300–3399   | Transfer    | Partial move, identical endpoints          |

/// Machine-readable error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Storage errors (1000–1199) ---
    /// Store file could not be opened or created.
    StorageOpen = 1000,
    /// Store file is held by another process.
    StorageLocked = 1001,
    /// Transaction begin or commit failed.
    StorageTransaction = 1002,
    /// Table operation failed.
    StorageTable = 1003,
    /// Data corruption detected (engine checksum or on-disk format mismatch).
    StorageCorruption = 1100,

    // --- Input errors (3000–3099) ---
    /// Timestamp is unparseable, lacks a timezone, or is out of range.
    InvalidTimestamp = 3000,
    /// Sensor, property, or group name violates naming rules.
    InvalidName = 3001,
    /// Time range start is after its end.
    InvalidRange = 3002,
    /// Invalid argument (oversized note, bad option combination).
    InvalidArgument = 3003,

    // --- Lookup errors (3100–3199) ---
    /// Requested key does not exist.
    NotFound = 3100,
    /// Collection exists but holds no entries.
    EmptyCollection = 3101,
    /// Sensor has no collections in the store.
    UnknownSensor = 3102,

    // --- Content errors (3200–3299) ---
    /// Stored metadata property is not valid structured text.
    MalformedMetadata = 3200,
    /// Value could not be serialized.
    Serialization = 3201,

    // --- Transfer errors (3300–3399) ---
    /// Move copied data but failed to remove it from the source.
    PartialMove = 3300,
    /// Copy or move with the same store and sensor on both ends.
    SameSourceAndDestination = 3301,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::StorageOpen),
            1001 => Some(Self::StorageLocked),
            1002 => Some(Self::StorageTransaction),
            1003 => Some(Self::StorageTable),
            1100 => Some(Self::StorageCorruption),
            3000 => Some(Self::InvalidTimestamp),
            3001 => Some(Self::InvalidName),
            3002 => Some(Self::InvalidRange),
            3003 => Some(Self::InvalidArgument),
            3100 => Some(Self::NotFound),
            3101 => Some(Self::EmptyCollection),
            3102 => Some(Self::UnknownSensor),
            3200 => Some(Self::MalformedMetadata),
            3201 => Some(Self::Serialization),
            3300 => Some(Self::PartialMove),
            3301 => Some(Self::SameSourceAndDestination),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt, typically after
    /// backoff. A partial move is never retryable: the caller must reconcile.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StorageLocked | Self::StorageTransaction)
    }

    /// Whether this error must stop the process.
    ///
    /// Only corruption is fatal; continuing to write risks further damage.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::StorageCorruption)
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::StorageOpen => {
                "Verify the store path exists with correct permissions and enough free space."
            },
            Self::StorageLocked => {
                "Another process holds the store. Retry with backoff or stop the other writer."
            },
            Self::StorageTransaction => "Retry the operation with backoff.",
            Self::StorageTable => "Check the collection name and the value sizes.",
            Self::StorageCorruption => {
                "Stop all writers and restore the store from the most recent backup."
            },
            Self::InvalidTimestamp => {
                "Send RFC 3339 timestamps with an explicit offset or epoch numbers."
            },
            Self::InvalidName => "Use only [A-Za-z0-9_.:/-] in sensor and group names.",
            Self::InvalidRange => "Pass a `since` bound that is not after `until`.",
            Self::InvalidArgument => "Fix the argument and retry.",
            Self::NotFound => "Expected for unset keys. Fall back to a default value.",
            Self::EmptyCollection => "The sensor has no readings yet. Retry after ingestion.",
            Self::UnknownSensor => "Check the sensor name against the store's sensor list.",
            Self::MalformedMetadata => "Overwrite the property with a valid YAML value.",
            Self::Serialization => "Report the value that failed to serialize.",
            Self::PartialMove => {
                "Data exists in both stores. Reconcile manually, then delete the source range."
            },
            Self::SameSourceAndDestination => {
                "Choose a different destination store or sensor name."
            },
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 16] = [
        ErrorCode::StorageOpen,
        ErrorCode::StorageLocked,
        ErrorCode::StorageTransaction,
        ErrorCode::StorageTable,
        ErrorCode::StorageCorruption,
        ErrorCode::InvalidTimestamp,
        ErrorCode::InvalidName,
        ErrorCode::InvalidRange,
        ErrorCode::InvalidArgument,
        ErrorCode::NotFound,
        ErrorCode::EmptyCollection,
        ErrorCode::UnknownSensor,
        ErrorCode::MalformedMetadata,
        ErrorCode::Serialization,
        ErrorCode::PartialMove,
        ErrorCode::SameSourceAndDestination,
    ];

    #[test]
    fn test_codes_roundtrip_through_u16() {
        for code in ALL {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_codes_are_unique() {
        let mut values: Vec<u16> = ALL.iter().map(|c| c.as_u16()).collect();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), ALL.len());
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        for code in ALL {
            assert_eq!(code.is_fatal(), code == ErrorCode::StorageCorruption);
        }
    }

    #[test]
    fn test_partial_move_is_not_retryable() {
        assert!(!ErrorCode::PartialMove.is_retryable());
        assert!(ErrorCode::StorageLocked.is_retryable());
    }

    #[test]
    fn test_every_code_has_an_action() {
        for code in ALL {
            assert!(!code.suggested_action().is_empty());
        }
    }
}
