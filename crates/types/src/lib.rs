//! Core types, errors, and validation for sensordb.
//!
//! This crate provides the foundational types used throughout the workspace:
//! - Readings and half-open time ranges
//! - Timestamp parsing and normalization to UTC
//! - Sensor name validation
//! - Structured metadata values (`MetaValue`)
//! - Store configuration
//! - Machine-readable error codes

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod metadata;
pub mod timestamp;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::ErrorCode;
pub use metadata::{DisplayConfig, MetaValue};
pub use timestamp::{TimestampError, parse_timestamp, truncate_to_micros};
pub use types::{Reading, TimeRange};
pub use validation::{SensorName, ValidationError};
