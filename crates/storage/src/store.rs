//! `SensorStore`: the entry point used by ingestion, export, plotting and the
//! admin CLI.

use std::path::Path;

use chrono::{DateTime, Utc};
use sensordb_types::{MetaValue, Reading, SensorName, TimeRange, config::StoreConfig};

use crate::{
    catalog::{SensorCatalog, StoreStatistics},
    engine::StorageEngine,
    error::Result,
    format::FormatLog,
    metadata::{MetadataCollection, SensorMetadata},
    notes::{AnnotationStore, NoteScan, NoteScope},
    plot_groups::PlotGroups,
    query::RangeQueryEngine,
    registry::StoreRegistry,
    series::{Scan, TimeSeriesCollection},
    transfer::{CopyMoveService, TransferOptions, TransferReport},
};

/// A sensor store.
///
/// Cheap to clone; clones share the underlying engine.
///
/// # Example
///
/// ```no_run
/// # use sensordb_storage::SensorStore;
/// # use sensordb_types::{SensorName, TimeRange, config::StoreConfig};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = SensorStore::open("sensors.redb", &StoreConfig::default())?;
/// let tank = SensorName::new("tank")?;
/// store.write_reading(&tank, chrono::Utc::now(), 1.5)?;
/// for reading in store.read_range(&tank, TimeRange::all())? {
///     println!("{:?}", reading?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SensorStore {
    engine: StorageEngine,
}

impl SensorStore {
    /// Opens (or creates) the store at `path` through the process-wide
    /// [`StoreRegistry`].
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        Ok(Self { engine: StoreRegistry::global().open(path, config)? })
    }

    /// Creates an in-memory store.
    pub fn in_memory(config: &StoreConfig) -> Result<Self> {
        Ok(Self { engine: StorageEngine::in_memory(config)? })
    }

    /// Wraps an already open engine.
    pub fn from_engine(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Underlying engine.
    pub fn engine(&self) -> &StorageEngine {
        &self.engine
    }

    /// Readings of `sensor`.
    pub fn series(&self, sensor: &SensorName) -> TimeSeriesCollection {
        TimeSeriesCollection::new(self.engine.clone(), sensor.clone())
    }

    /// Metadata of `sensor`.
    pub fn metadata(&self, sensor: &SensorName) -> MetadataCollection {
        MetadataCollection::new(self.engine.clone(), sensor.clone())
    }

    /// Format hint log of `sensor`.
    pub fn format_log(&self, sensor: &SensorName) -> FormatLog {
        FormatLog::new(self.engine.clone(), sensor.clone())
    }

    /// Global and per-sensor notes.
    pub fn notes(&self) -> AnnotationStore {
        AnnotationStore::new(self.engine.clone())
    }

    /// Plot group definitions.
    pub fn plot_groups(&self) -> PlotGroups {
        PlotGroups::new(self.engine.clone())
    }

    /// Sensor listing and statistics.
    pub fn catalog(&self) -> SensorCatalog {
        SensorCatalog::new(self.engine.clone())
    }

    /// Multi-sensor queries.
    pub fn query(&self) -> RangeQueryEngine {
        RangeQueryEngine::new(self.engine.clone())
    }

    /// Stores one reading, overwriting any reading at the same timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::InvalidTimestamp`] for timestamps outside
    /// the encodable years.
    pub fn write_reading(&self, sensor: &SensorName, timestamp: DateTime<Utc>, value: f64) -> Result<()> {
        self.series(sensor).put(timestamp, value)
    }

    /// Lazy scan of the readings of `sensor` in `[range.since, range.until)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::InvalidRange`] if `since` is after `until`.
    pub fn read_range(&self, sensor: &SensorName, range: TimeRange) -> Result<Scan> {
        self.series(sensor).scan(range, None)
    }

    /// Latest reading of `sensor`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::EmptyCollection`] when the sensor has no
    /// readings.
    pub fn latest_reading(&self, sensor: &SensorName) -> Result<Reading> {
        self.series(sensor).last()
    }

    /// All metadata properties of `sensor`.
    pub fn get_metadata(&self, sensor: &SensorName) -> Result<SensorMetadata> {
        self.metadata(sensor).all()
    }

    /// Sets one metadata property.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::InvalidName`] for an empty property name.
    pub fn set_metadata(&self, sensor: &SensorName, property: &str, value: &MetaValue) -> Result<()> {
        self.metadata(sensor).set(property, value)
    }

    /// Adds a global or sensor note, replacing one at the same timestamp.
    pub fn add_note(&self, scope: &NoteScope, timestamp: DateTime<Utc>, text: &str) -> Result<()> {
        self.notes().add(scope, timestamp, text)
    }

    /// Lazy scan of the notes in `[range.since, range.until)`.
    pub fn read_notes(&self, scope: &NoteScope, range: TimeRange) -> Result<NoteScan> {
        self.notes().scan(scope, range, None)
    }

    /// Copies (or moves) readings of `sensor` in `range` into `dst`, with
    /// metadata and notes.
    pub fn copy_sensor(
        &self,
        dst: &SensorStore,
        sensor: &SensorName,
        range: TimeRange,
        move_data: bool,
    ) -> Result<TransferReport> {
        let options = TransferOptions::builder().range(range).build();
        self.transfer(dst, sensor, &options, move_data)
    }

    /// Copies or moves with explicit options.
    pub fn transfer(
        &self,
        dst: &SensorStore,
        sensor: &SensorName,
        options: &TransferOptions,
        move_data: bool,
    ) -> Result<TransferReport> {
        if move_data {
            CopyMoveService::move_sensor(&self.engine, &dst.engine, sensor, options)
        } else {
            CopyMoveService::copy(&self.engine, &dst.engine, sensor, options)
        }
    }

    /// Every sensor in the store, by name.
    pub fn list_sensors(&self) -> Result<Vec<SensorName>> {
        self.catalog().list_sensors()
    }

    /// Drops every collection of `sensor`. Returns whether it existed.
    pub fn delete_sensor(&self, sensor: &SensorName) -> Result<bool> {
        self.catalog().delete_sensor(sensor)
    }

    /// Per-sensor counts and the store file size.
    pub fn statistics(&self) -> Result<StoreStatistics> {
        self.catalog().statistics()
    }

    /// See [`StorageEngine::compact`].
    pub fn compact(&self) {
        self.engine.compact();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use sensordb_types::ErrorCode;

    use super::*;
    use crate::error::StoreError;

    fn name(s: &str) -> SensorName {
        SensorName::new(s).unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn store() -> SensorStore {
        SensorStore::in_memory(&StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_write_and_read_range() {
        let store = store();
        let tank = name("tank");
        for minute in [4, 0, 2] {
            store.write_reading(&tank, at(minute), f64::from(minute)).unwrap();
        }

        let readings: Vec<Reading> = store
            .read_range(&tank, TimeRange::between(at(0), at(4)))
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(readings, vec![Reading::new(at(0), 0.0), Reading::new(at(2), 2.0)]);
        assert_eq!(store.latest_reading(&tank).unwrap(), Reading::new(at(4), 4.0));
    }

    #[test]
    fn test_latest_reading_of_empty_sensor() {
        let store = store();
        let err = store.latest_reading(&name("idle")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EmptyCollection);
    }

    #[test]
    fn test_metadata_round_trip() {
        let store = store();
        let tank = name("tank");
        store.set_metadata(&tank, "unit", &MetaValue::from("bar")).unwrap();
        store.set_metadata(&tank, "scale", &MetaValue::from(0.5)).unwrap();

        let metadata = store.get_metadata(&tank).unwrap();
        assert_eq!(metadata.get("unit"), Some(&MetaValue::from("bar")));
        assert_eq!(metadata.get("scale"), Some(&MetaValue::from(0.5)));
        assert!(metadata.malformed.is_empty());
    }

    #[test]
    fn test_notes_by_scope() {
        let store = store();
        let tank = NoteScope::Sensor(name("tank"));
        store.add_note(&NoteScope::Global, at(1), "maintenance window").unwrap();
        store.add_note(&tank, at(2), "valve replaced").unwrap();

        let global: Vec<String> = store
            .read_notes(&NoteScope::Global, TimeRange::all())
            .unwrap()
            .map(|note| note.unwrap().text)
            .collect();
        assert_eq!(global, vec!["maintenance window".to_string()]);

        let local: Vec<String> =
            store.read_notes(&tank, TimeRange::all()).unwrap().map(|note| note.unwrap().text).collect();
        assert_eq!(local, vec!["valve replaced".to_string()]);
    }

    #[test]
    fn test_copy_sensor_between_stores() {
        let (src, dst) = (store(), store());
        let tank = name("tank");
        for minute in 0..4 {
            src.write_reading(&tank, at(minute), f64::from(minute)).unwrap();
        }

        let report = src.copy_sensor(&dst, &tank, TimeRange::since(at(2)), true).unwrap();
        assert!(report.moved);
        assert_eq!(report.readings, 2);
        assert_eq!(src.latest_reading(&tank).unwrap().value, 1.0);
        assert_eq!(dst.series(&tank).len().unwrap(), 2);
    }

    #[test]
    fn test_copy_onto_itself_rejected() {
        let store = store();
        let tank = name("tank");
        store.write_reading(&tank, at(0), 1.0).unwrap();
        let err = store.copy_sensor(&store.clone(), &tank, TimeRange::all(), false).unwrap_err();
        assert!(matches!(err, StoreError::SameSourceAndDestination { .. }));
    }

    #[test]
    fn test_catalog_operations() {
        let store = store();
        store.write_reading(&name("b"), at(0), 1.0).unwrap();
        store.write_reading(&name("a"), at(0), 1.0).unwrap();
        assert_eq!(store.list_sensors().unwrap(), vec![name("a"), name("b")]);

        assert!(store.delete_sensor(&name("a")).unwrap());
        assert_eq!(store.list_sensors().unwrap(), vec![name("b")]);
        assert_eq!(store.statistics().unwrap().sensors.len(), 1);
        store.compact();
    }

    #[test]
    fn test_open_twice_shares_engine() {
        let dir = sensordb_test_utils::TestDir::new();
        let path = dir.store_path("facade");
        let a = SensorStore::open(&path, &StoreConfig::default()).unwrap();
        let b = SensorStore::open(&path, &StoreConfig::default()).unwrap();
        assert!(a.engine().same_store(b.engine()));

        a.write_reading(&name("tank"), at(0), 2.0).unwrap();
        assert_eq!(b.latest_reading(&name("tank")).unwrap().value, 2.0);
        StoreRegistry::global().close(&path).unwrap();
    }
}
