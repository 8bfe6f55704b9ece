//! Storage layer for sensordb.
//!
//! This crate provides:
//! - redb-based persistent storage, one file per store
//! - Per-sensor time series keyed by fixed-width ISO-8601 timestamps
//! - Structured sensor metadata and plot group definitions
//! - Global and per-sensor notes
//! - Multi-sensor range queries from a single snapshot
//! - Copy and move of sensor data between stores
//! - A process-wide registry sharing one engine per store file

mod catalog;
mod engine;
mod error;
mod format;
mod keys;
mod metadata;
mod notes;
mod plot_groups;
mod query;
mod registry;
mod scan;
mod series;
mod store;
mod tables;
mod transfer;

pub use catalog::{SensorCatalog, SensorStatistics, StoreStatistics};
pub use engine::StorageEngine;
pub use error::{Result, StoreError};
pub use format::{FormatLog, VALUE_CODEC};
pub use keys::{KEY_LEN, decode_timestamp, encode_timestamp};
pub use metadata::{MetadataCollection, SensorMetadata};
pub use notes::{AnnotationStore, Note, NoteScan, NoteScope};
pub use plot_groups::PlotGroups;
pub use query::{QueryResult, RangeQueryEngine, Timeline, TimelineRow, merge_timeline};
pub use registry::StoreRegistry;
pub use scan::TimeScan;
pub use series::{Scan, TimeSeriesCollection, VALUE_LEN, decode_value, encode_value};
pub use store::SensorStore;
pub use tables::{CollectionId, Role, Tables};
pub use transfer::{CopyMoveService, TransferOptions, TransferReport};
