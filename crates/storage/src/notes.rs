//! Annotation store: timestamped free-text notes.
//!
//! Notes are kept either store-wide (`notes`) or per sensor
//! (`notes_{sensor}`), keyed by timestamp like readings. A note added at an
//! existing scope and timestamp replaces the previous one.

use std::fmt;

use chrono::{DateTime, Utc};
use redb::WriteTransaction;
use sensordb_types::{SensorName, TimeRange};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, Result, StorageSnafu, StoreError, TableSnafu},
    keys::{decode_timestamp, encode_timestamp},
    scan::TimeScan,
    series::check_range,
    tables::{self, CollectionId, Role, definition},
};

/// Lazy scan over notes.
pub type NoteScan = TimeScan<Note>;

/// Where a note is attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteScope {
    /// Store-wide note.
    Global,
    /// Note on one sensor.
    Sensor(SensorName),
}

impl NoteScope {
    /// Collection holding notes of this scope.
    pub fn collection(&self) -> CollectionId {
        match self {
            Self::Global => CollectionId::GlobalNotes,
            Self::Sensor(sensor) => CollectionId::sensor(sensor, Role::Notes),
        }
    }
}

impl fmt::Display for NoteScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Sensor(sensor) => write!(f, "sensor {sensor}"),
        }
    }
}

/// A timestamped note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// When the note applies.
    pub timestamp: DateTime<Utc>,
    /// Free text.
    pub text: String,
}

pub(crate) fn decode_note(collection: &str, key: &str, value: &[u8]) -> Result<Note> {
    let text = String::from_utf8(value.to_vec()).map_err(|e| StoreError::Corrupted {
        message: format!("note {key} in {collection} is not UTF-8: {e}"),
    })?;
    Ok(Note { timestamp: decode_timestamp(collection, key)?, text })
}

/// Opens the notes collection of `scope` for writing, creating the sensor's
/// collections when needed.
fn open_for_write<'txn>(
    txn: &'txn WriteTransaction,
    scope: &NoteScope,
    name: &str,
) -> Result<redb::Table<'txn, &'static str, &'static [u8]>> {
    if let NoteScope::Sensor(sensor) = scope {
        tables::ensure_sensor_collections(txn, sensor)?;
    }
    txn.open_table(definition(name)).context(TableSnafu)
}

/// Global and per-sensor notes of one store.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    engine: StorageEngine,
}

impl AnnotationStore {
    pub(crate) fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Adds a note, replacing an existing note at the same scope and time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if `text` exceeds the
    /// configured `max_note_bytes`.
    pub fn add(&self, scope: &NoteScope, timestamp: DateTime<Utc>, text: &str) -> Result<()> {
        let max = self.engine.config().max_note_bytes;
        if text.len() > max {
            return Err(StoreError::InvalidArgument {
                message: format!("note of {} bytes exceeds max_note_bytes {max}", text.len()),
            });
        }
        let key = encode_timestamp(timestamp)?;
        let name = scope.collection().name();

        let txn = self.engine.begin_write()?;
        {
            let mut table = open_for_write(&txn, scope, &name)?;
            table.insert(key.as_str(), text.as_bytes()).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        debug!(%scope, %timestamp, "Added note");
        Ok(())
    }

    /// Note at exactly `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is none.
    pub fn get(&self, scope: &NoteScope, timestamp: DateTime<Utc>) -> Result<String> {
        let key = encode_timestamp(timestamp)?;
        let name = scope.collection().name();
        let txn = self.engine.begin_read()?;
        let not_found = || StoreError::NotFound { collection: name.clone(), key: key.clone() };
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Err(not_found());
        };
        match table.get(key.as_str()).context(StorageSnafu)? {
            Some(value) => Ok(decode_note(&name, &key, value.value())?.text),
            None => Err(not_found()),
        }
    }

    /// Removes the note at `timestamp`. Returns whether one existed.
    pub fn remove(&self, scope: &NoteScope, timestamp: DateTime<Utc>) -> Result<bool> {
        let key = encode_timestamp(timestamp)?;
        let name = scope.collection().name();
        let txn = self.engine.begin_write()?;
        if !tables::exists_in(&txn, &name)? {
            return Ok(false);
        }
        let removed = {
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            table.remove(key.as_str()).context(StorageSnafu)?.is_some()
        };
        txn.commit().context(CommitSnafu)?;
        Ok(removed)
    }

    /// Lazy ascending scan of the notes in `[range.since, range.until)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] if `since` is after `until`.
    pub fn scan(&self, scope: &NoteScope, range: TimeRange, limit: Option<usize>) -> Result<NoteScan> {
        check_range(&range)?;
        let name = scope.collection().name();
        let txn = self.engine.begin_read()?;
        let table = tables::open_read(&txn, &name)?;
        TimeScan::new(name, table, &range, limit, self.engine.config().scan_batch_size, decode_note)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use sensordb_types::config::StoreConfig;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap()
    }

    fn store_with(config: StoreConfig) -> AnnotationStore {
        AnnotationStore::new(StorageEngine::in_memory(&config).unwrap())
    }

    fn store() -> AnnotationStore {
        store_with(StoreConfig::default())
    }

    fn texts(scan: NoteScan) -> Vec<String> {
        scan.map(|n| n.unwrap().text).collect()
    }

    #[test]
    fn test_global_notes() {
        let notes = store();
        notes.add(&NoteScope::Global, at(2), "refilled").unwrap();
        notes.add(&NoteScope::Global, at(1), "maintenance").unwrap();

        let scan = notes.scan(&NoteScope::Global, TimeRange::all(), None).unwrap();
        assert_eq!(texts(scan), vec!["maintenance", "refilled"]);
        assert_eq!(notes.get(&NoteScope::Global, at(1)).unwrap(), "maintenance");
    }

    #[test]
    fn test_add_overwrites() {
        let notes = store();
        notes.add(&NoteScope::Global, at(1), "first").unwrap();
        notes.add(&NoteScope::Global, at(1), "second").unwrap();
        let scan = notes.scan(&NoteScope::Global, TimeRange::all(), None).unwrap();
        assert_eq!(texts(scan), vec!["second"]);
    }

    #[test]
    fn test_sensor_scope_is_separate() {
        let notes = store();
        let tank = NoteScope::Sensor(SensorName::new("tank").unwrap());
        notes.add(&tank, at(1), "valve replaced").unwrap();

        assert!(texts(notes.scan(&NoteScope::Global, TimeRange::all(), None).unwrap()).is_empty());
        assert_eq!(texts(notes.scan(&tank, TimeRange::all(), None).unwrap()), vec!["valve replaced"]);
    }

    #[test]
    fn test_sensor_note_creates_sensor_collections() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let notes = AnnotationStore::new(engine.clone());
        let tank = SensorName::new("tank").unwrap();
        notes.add(&NoteScope::Sensor(tank.clone()), at(1), "installed").unwrap();

        let txn = engine.begin_read().unwrap();
        for role in Role::ALL {
            let name = CollectionId::sensor(&tank, role).name();
            assert!(tables::open_read(&txn, &name).unwrap().is_some(), "{name}");
        }
    }

    #[test]
    fn test_scan_range_is_half_open() {
        let notes = store();
        for hour in 0..4 {
            notes.add(&NoteScope::Global, at(hour), &format!("n{hour}")).unwrap();
        }
        let scan = notes.scan(&NoteScope::Global, TimeRange::between(at(1), at(3)), None).unwrap();
        assert_eq!(texts(scan), vec!["n1", "n2"]);
    }

    #[test]
    fn test_note_size_limit() {
        let notes = store_with(StoreConfig::builder().max_note_bytes(8).build().unwrap());
        notes.add(&NoteScope::Global, at(0), "12345678").unwrap();
        let err = notes.add(&NoteScope::Global, at(1), "123456789").unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument { .. }));
    }

    #[test]
    fn test_get_and_remove() {
        let notes = store();
        assert!(matches!(notes.get(&NoteScope::Global, at(0)), Err(StoreError::NotFound { .. })));
        assert!(!notes.remove(&NoteScope::Global, at(0)).unwrap());

        notes.add(&NoteScope::Global, at(0), "x").unwrap();
        assert!(notes.remove(&NoteScope::Global, at(0)).unwrap());
        assert!(notes.get(&NoteScope::Global, at(0)).is_err());
    }
}
