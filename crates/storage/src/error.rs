//! Storage layer errors.

use chrono::{DateTime, Utc};
use redb::{CommitError, DatabaseError, StorageError as RedbStorageError, TableError, TransactionError};
use sensordb_types::{ErrorCode, TimestampError, ValidationError};
use snafu::Snafu;

/// Errors returned by sensordb storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("Failed to open store at {path}: {source}"))]
    Open { path: String, source: DatabaseError },

    #[snafu(display("Store at {path} is locked by another process"))]
    StoreLocked { path: String },

    #[snafu(display("I/O error on {path}: {source}"))]
    Io { path: String, source: std::io::Error },

    #[snafu(display("Invalid timestamp: {source}"))]
    InvalidTimestamp { source: TimestampError },

    #[snafu(display("Invalid name: {source}"))]
    InvalidName { source: ValidationError },

    #[snafu(display("Invalid range: since {since} is after until {until}"))]
    InvalidRange { since: DateTime<Utc>, until: DateTime<Utc> },

    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument { message: String },

    #[snafu(display("Key {key} not found in {collection}"))]
    NotFound { collection: String, key: String },

    #[snafu(display("Collection {collection} is empty"))]
    EmptyCollection { collection: String },

    #[snafu(display("Unknown sensor: {sensor}"))]
    UnknownSensor { sensor: String },

    #[snafu(display("Malformed metadata {sensor}.{property}: {message}"))]
    MalformedMetadata { sensor: String, property: String, message: String },

    #[snafu(display(
        "Move of {sensor} copied {copied} readings but failed to remove them from the source: {source}"
    ))]
    PartialMove { sensor: String, copied: usize, source: Box<StoreError> },

    #[snafu(display("Source and destination of {sensor} are identical"))]
    SameSourceAndDestination { sensor: String },

    #[snafu(display("Store corrupted: {message}"))]
    Corrupted { message: String },

    #[snafu(display("Serialization error: {message}"))]
    Serialization { message: String },

    #[snafu(display("Storage error: {source}"))]
    Storage { source: RedbStorageError },

    #[snafu(display("Table error: {source}"))]
    Table { source: TableError },

    #[snafu(display("Transaction error: {source}"))]
    Transaction { source: TransactionError },

    #[snafu(display("Commit error: {source}"))]
    Commit { source: CommitError },
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Machine-readable code of this error.
    pub fn code(&self) -> ErrorCode {
        if self.is_fatal() {
            return ErrorCode::StorageCorruption;
        }
        match self {
            Self::Open { .. } | Self::Io { .. } => ErrorCode::StorageOpen,
            Self::StoreLocked { .. } => ErrorCode::StorageLocked,
            Self::InvalidTimestamp { .. } => ErrorCode::InvalidTimestamp,
            Self::InvalidName { .. } => ErrorCode::InvalidName,
            Self::InvalidRange { .. } => ErrorCode::InvalidRange,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::EmptyCollection { .. } => ErrorCode::EmptyCollection,
            Self::UnknownSensor { .. } => ErrorCode::UnknownSensor,
            Self::MalformedMetadata { .. } => ErrorCode::MalformedMetadata,
            Self::PartialMove { .. } => ErrorCode::PartialMove,
            Self::SameSourceAndDestination { .. } => ErrorCode::SameSourceAndDestination,
            Self::Corrupted { .. } => ErrorCode::StorageCorruption,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::Storage { .. } | Self::Table { .. } => ErrorCode::StorageTable,
            Self::Transaction { .. } | Self::Commit { .. } => ErrorCode::StorageTransaction,
        }
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Whether the store must no longer be used.
    ///
    /// True for engine-reported corruption and for keys or values that
    /// violate the on-disk format.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corrupted { .. } => true,
            Self::Storage { source } => is_corruption(source),
            Self::Table { source: TableError::Storage(source) } => is_corruption(source),
            Self::Transaction { source: TransactionError::Storage(source) } => {
                is_corruption(source)
            }
            Self::Commit { source: CommitError::Storage(source) } => is_corruption(source),
            Self::Open { source: DatabaseError::Storage(source), .. } => is_corruption(source),
            Self::PartialMove { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

fn is_corruption(error: &RedbStorageError) -> bool {
    matches!(error, RedbStorageError::Corrupted(_))
}
