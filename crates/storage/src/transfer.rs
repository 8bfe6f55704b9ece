//! Copy and move of sensor data between stores.
//!
//! A transfer between two stores runs in two phases, each atomic in its own
//! store: the destination write commits first, then (for moves) the source
//! removal. A move reads the source inside the write transaction that later
//! removes it, so writers to the source wait until the move completes and no
//! reading is removed that was not copied. A failure in the second phase
//! leaves the data in both stores and is reported as
//! [`StoreError::PartialMove`]. A transfer within one store is a single write
//! transaction.
//!
//! The format hint log travels with the readings and is merged into the
//! destination log; a move leaves it on the source, like metadata.

use std::ops::Bound;

use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use sensordb_types::{SensorName, TimeRange};
use serde::Serialize;
use snafu::ResultExt;
use tracing::{info, warn};

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, Result, StorageSnafu, StoreError, TableSnafu},
    format::{decode_hint, record_in},
    keys::{decode_timestamp, encode_timestamp},
    notes::decode_note,
    series::{check_range, decode_reading},
    tables::{self, CollectionId, Role, definition},
};

/// What to transfer.
#[derive(Debug, Clone, bon::Builder)]
pub struct TransferOptions {
    /// Readings and notes in `[since, until)` are transferred.
    #[builder(default)]
    pub range: TimeRange,
    /// Copy every metadata property (overwriting on the destination).
    #[builder(default = true)]
    pub include_metadata: bool,
    /// Copy sensor notes in range; a move also removes them from the source.
    #[builder(default = true)]
    pub include_notes: bool,
    /// Destination sensor name; defaults to the source sensor.
    pub dest_sensor: Option<SensorName>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Outcome of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Source sensor.
    pub sensor: SensorName,
    /// Destination sensor.
    pub dest_sensor: SensorName,
    /// Readings written to the destination.
    pub readings: usize,
    /// Metadata properties written to the destination.
    pub metadata: usize,
    /// Notes written to the destination.
    pub notes: usize,
    /// Whether the transferred readings and notes were removed from the
    /// source.
    pub moved: bool,
}

type Entry = (String, Vec<u8>);

/// Raw entries read from the source. Moves delete exactly these keys.
#[derive(Debug, Default)]
struct Payload {
    readings: Vec<Entry>,
    metadata: Vec<Entry>,
    notes: Vec<Entry>,
    format: Vec<Entry>,
}

fn entries_in(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<Vec<Entry>> {
    if let (Some(since), Some(until)) = (since, until) {
        if since >= until {
            return Ok(Vec::new());
        }
    }
    let lower = since.map_or(Bound::Unbounded, Bound::Included);
    let upper = until.map_or(Bound::Unbounded, Bound::Excluded);
    let mut entries = Vec::new();
    for entry in table.range::<&str>((lower, upper)).context(StorageSnafu)? {
        let (key, value) = entry.context(StorageSnafu)?;
        entries.push((key.value().to_string(), value.value().to_vec()));
    }
    Ok(entries)
}

struct Bounds {
    since: Option<String>,
    until: Option<String>,
}

impl Bounds {
    fn new(range: &TimeRange) -> Result<Self> {
        Ok(Self {
            since: range.since.map(encode_timestamp).transpose()?,
            until: range.until.map(encode_timestamp).transpose()?,
        })
    }
}

/// Source tables of one transfer, read or write handles alike.
struct SourceTables<'a> {
    data: &'a dyn EntrySource,
    meta: Option<&'a dyn EntrySource>,
    notes: Option<&'a dyn EntrySource>,
    format: Option<&'a dyn EntrySource>,
}

/// Reads the payload from open source tables, validating every entry.
fn collect_payload(sensor: &SensorName, source: &SourceTables<'_>, bounds: &Bounds) -> Result<Payload> {
    let SourceTables { data, meta, notes, format } = *source;
    let data_name = CollectionId::sensor(sensor, Role::Data).name();
    let readings = data.entries(bounds.since.as_deref(), bounds.until.as_deref())?;
    for (key, value) in &readings {
        decode_reading(&data_name, key, value)?;
    }

    let metadata = match meta {
        Some(meta) => meta.entries(None, None)?,
        None => Vec::new(),
    };

    let notes = match notes {
        Some(notes) => {
            let notes_name = CollectionId::sensor(sensor, Role::Notes).name();
            let entries = notes.entries(bounds.since.as_deref(), bounds.until.as_deref())?;
            for (key, value) in &entries {
                decode_note(&notes_name, key, value)?;
            }
            entries
        },
        None => Vec::new(),
    };

    let format = match format {
        Some(format) => {
            let format_name = CollectionId::sensor(sensor, Role::Format).name();
            let entries = format.entries(None, None)?;
            for (key, value) in &entries {
                decode_timestamp(&format_name, key)?;
                decode_hint(value)?;
            }
            entries
        },
        None => Vec::new(),
    };

    Ok(Payload { readings, metadata, notes, format })
}

/// Payload of `sensor` as of a read snapshot.
fn read_payload(
    txn: &ReadTransaction,
    sensor: &SensorName,
    options: &TransferOptions,
    bounds: &Bounds,
) -> Result<Payload> {
    let data = tables::open_read(txn, &CollectionId::sensor(sensor, Role::Data).name())?
        .ok_or_else(|| StoreError::UnknownSensor { sensor: sensor.to_string() })?;
    let open = move |role: Role, wanted: bool| {
        if wanted { tables::open_read(txn, &CollectionId::sensor(sensor, role).name()) } else { Ok(None) }
    };
    let meta = open(Role::Meta, options.include_metadata)?;
    let notes = open(Role::Notes, options.include_notes)?;
    let format = open(Role::Format, true)?;

    collect_payload(
        sensor,
        &SourceTables {
            data: &data,
            meta: meta.as_ref().map(|t| t as &dyn EntrySource),
            notes: notes.as_ref().map(|t| t as &dyn EntrySource),
            format: format.as_ref().map(|t| t as &dyn EntrySource),
        },
        bounds,
    )
}

/// Payload of `sensor` as seen by a write transaction that may later remove
/// it.
fn write_txn_payload(
    txn: &WriteTransaction,
    sensor: &SensorName,
    options: &TransferOptions,
    bounds: &Bounds,
) -> Result<Payload> {
    let data_name = CollectionId::sensor(sensor, Role::Data).name();
    if !tables::exists_in(txn, &data_name)? {
        return Err(StoreError::UnknownSensor { sensor: sensor.to_string() });
    }
    let open = move |role: Role, wanted: bool| -> Result<_> {
        if !wanted {
            return Ok(None);
        }
        let name = CollectionId::sensor(sensor, role).name();
        Ok(Some(txn.open_table(definition(&name)).context(TableSnafu)?))
    };
    let data = txn.open_table(definition(&data_name)).context(TableSnafu)?;
    let meta = open(Role::Meta, options.include_metadata)?;
    let notes = open(Role::Notes, options.include_notes)?;
    let format = open(Role::Format, true)?;

    collect_payload(
        sensor,
        &SourceTables {
            data: &data,
            meta: meta.as_ref().map(|t| t as &dyn EntrySource),
            notes: notes.as_ref().map(|t| t as &dyn EntrySource),
            format: format.as_ref().map(|t| t as &dyn EntrySource),
        },
        bounds,
    )
}

/// Object-safe view of a source table; read and write transactions open
/// tables of different types.
trait EntrySource {
    fn entries(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<Entry>>;
}

impl<T: ReadableTable<&'static str, &'static [u8]>> EntrySource for T {
    fn entries(&self, since: Option<&str>, until: Option<&str>) -> Result<Vec<Entry>> {
        entries_in(self, since, until)
    }
}

fn insert_all(txn: &WriteTransaction, name: &str, entries: &[Entry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(definition(name)).context(TableSnafu)?;
    for (key, value) in entries {
        table.insert(key.as_str(), value.as_slice()).context(StorageSnafu)?;
    }
    Ok(())
}

fn remove_all(txn: &WriteTransaction, name: &str, entries: &[Entry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let mut table = txn.open_table(definition(name)).context(TableSnafu)?;
    for (key, _) in entries {
        table.remove(key.as_str()).context(StorageSnafu)?;
    }
    Ok(())
}

fn write_payload(txn: &WriteTransaction, dest: &SensorName, payload: &Payload) -> Result<()> {
    tables::ensure_sensor_collections(txn, dest)?;
    insert_all(txn, &CollectionId::sensor(dest, Role::Data).name(), &payload.readings)?;
    insert_all(txn, &CollectionId::sensor(dest, Role::Meta).name(), &payload.metadata)?;
    insert_all(txn, &CollectionId::sensor(dest, Role::Notes).name(), &payload.notes)?;

    if !payload.format.is_empty() {
        let name = CollectionId::sensor(dest, Role::Format).name();
        let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
        for (key, value) in &payload.format {
            record_in(&mut table, decode_timestamp(&name, key)?, &decode_hint(value)?)?;
        }
    }
    Ok(())
}

fn remove_payload(txn: &WriteTransaction, sensor: &SensorName, payload: &Payload) -> Result<()> {
    remove_all(txn, &CollectionId::sensor(sensor, Role::Data).name(), &payload.readings)?;
    remove_all(txn, &CollectionId::sensor(sensor, Role::Notes).name(), &payload.notes)?;
    Ok(())
}

fn report(sensor: &SensorName, dest: &SensorName, payload: &Payload, moved: bool) -> TransferReport {
    TransferReport {
        sensor: sensor.clone(),
        dest_sensor: dest.clone(),
        readings: payload.readings.len(),
        metadata: payload.metadata.len(),
        notes: payload.notes.len(),
        moved,
    }
}

/// Turns the outcome of the source removal of a move into the final result.
fn finish_move(report: TransferReport, removal: Result<()>) -> Result<TransferReport> {
    match removal {
        Ok(()) => Ok(TransferReport { moved: true, ..report }),
        Err(source) => {
            warn!(
                sensor = %report.sensor,
                copied = report.readings,
                error = %source,
                "Move copied data but could not remove it from the source"
            );
            Err(StoreError::PartialMove {
                sensor: report.sensor.to_string(),
                copied: report.readings,
                source: Box::new(source),
            })
        },
    }
}

/// Copies and moves sensor data between stores.
pub struct CopyMoveService;

impl CopyMoveService {
    /// Copies readings (and optionally metadata and notes) of `sensor` from
    /// `src` to `dst`. Existing destination entries with the same key are
    /// overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSensor`] if `sensor` has no data
    /// collection in `src`, and [`StoreError::SameSourceAndDestination`] when
    /// copying a sensor onto itself.
    pub fn copy(
        src: &StorageEngine,
        dst: &StorageEngine,
        sensor: &SensorName,
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        Self::transfer(src, dst, sensor, options, false)
    }

    /// Copies like [`copy`](Self::copy), then removes the copied readings
    /// and notes from the source. Metadata stays on the source.
    ///
    /// Writers to the source block until the move completes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PartialMove`] when the copy committed but the
    /// removal from the source failed.
    pub fn move_sensor(
        src: &StorageEngine,
        dst: &StorageEngine,
        sensor: &SensorName,
        options: &TransferOptions,
    ) -> Result<TransferReport> {
        Self::transfer(src, dst, sensor, options, true)
    }

    fn transfer(
        src: &StorageEngine,
        dst: &StorageEngine,
        sensor: &SensorName,
        options: &TransferOptions,
        remove_source: bool,
    ) -> Result<TransferReport> {
        check_range(&options.range)?;
        let dest = options.dest_sensor.clone().unwrap_or_else(|| sensor.clone());
        let bounds = Bounds::new(&options.range)?;

        let report = if src.same_store(dst) {
            if &dest == sensor {
                return Err(StoreError::SameSourceAndDestination { sensor: sensor.to_string() });
            }
            Self::within_store(src, sensor, &dest, options, &bounds, remove_source)?
        } else {
            Self::across_stores(src, dst, sensor, &dest, options, &bounds, remove_source)?
        };

        info!(
            sensor = %report.sensor,
            dest_sensor = %report.dest_sensor,
            readings = report.readings,
            metadata = report.metadata,
            notes = report.notes,
            moved = report.moved,
            "Transferred sensor data"
        );
        Ok(report)
    }

    fn within_store(
        engine: &StorageEngine,
        sensor: &SensorName,
        dest: &SensorName,
        options: &TransferOptions,
        bounds: &Bounds,
        remove_source: bool,
    ) -> Result<TransferReport> {
        let txn = engine.begin_write()?;
        let payload = write_txn_payload(&txn, sensor, options, bounds)?;
        write_payload(&txn, dest, &payload)?;
        if remove_source {
            remove_payload(&txn, sensor, &payload)?;
        }
        txn.commit().context(CommitSnafu)?;
        Ok(report(sensor, dest, &payload, remove_source))
    }

    fn across_stores(
        src: &StorageEngine,
        dst: &StorageEngine,
        sensor: &SensorName,
        dest: &SensorName,
        options: &TransferOptions,
        bounds: &Bounds,
        remove_source: bool,
    ) -> Result<TransferReport> {
        if !remove_source {
            let payload = read_payload(&src.begin_read()?, sensor, options, bounds)?;
            let txn = dst.begin_write()?;
            write_payload(&txn, dest, &payload)?;
            txn.commit().context(CommitSnafu)?;
            return Ok(report(sensor, dest, &payload, false));
        }

        // The source transaction stays open until the copied keys are removed.
        let (src_txn, dst_txn) = src.begin_write_pair(dst)?;
        let payload = write_txn_payload(&src_txn, sensor, options, bounds)?;
        write_payload(&dst_txn, dest, &payload)?;
        dst_txn.commit().context(CommitSnafu)?;
        let copied = report(sensor, dest, &payload, false);

        let removal = remove_payload(&src_txn, sensor, &payload).and_then(|()| src_txn.commit().context(CommitSnafu));
        finish_move(copied, removal)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{thread, time::Duration};

    use chrono::{DateTime, TimeZone, Utc};
    use sensordb_types::{ErrorCode, MetaValue, config::StoreConfig};

    use super::*;
    use crate::{
        format::{FormatLog, VALUE_CODEC},
        metadata::MetadataCollection,
        notes::{AnnotationStore, NoteScope},
        series::TimeSeriesCollection,
    };

    fn name(s: &str) -> SensorName {
        SensorName::new(s).unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn engine() -> StorageEngine {
        StorageEngine::in_memory(&StoreConfig::default()).unwrap()
    }

    fn seeded() -> StorageEngine {
        let engine = engine();
        let series = TimeSeriesCollection::new(engine.clone(), name("tank"));
        for minute in 0..5 {
            series.put(at(minute), f64::from(minute)).unwrap();
        }
        MetadataCollection::new(engine.clone(), name("tank")).set("unit", &MetaValue::from("bar")).unwrap();
        AnnotationStore::new(engine.clone())
            .add(&NoteScope::Sensor(name("tank")), at(1), "refilled")
            .unwrap();
        engine
    }

    fn values(engine: &StorageEngine, sensor: &str) -> Vec<f64> {
        TimeSeriesCollection::new(engine.clone(), name(sensor))
            .scan(TimeRange::all(), None)
            .unwrap()
            .map(|r| r.unwrap().value)
            .collect()
    }

    #[test]
    fn test_copy_across_stores() {
        let (src, dst) = (seeded(), engine());
        FormatLog::new(src.clone(), name("tank")).record("%.2f").unwrap();
        let report = CopyMoveService::copy(&src, &dst, &name("tank"), &TransferOptions::default()).unwrap();

        assert_eq!(report.readings, 5);
        assert_eq!(report.metadata, 1);
        assert_eq!(report.notes, 1);
        assert!(!report.moved);
        assert_eq!(values(&dst, "tank"), values(&src, "tank"));
        assert_eq!(
            MetadataCollection::new(dst.clone(), name("tank")).get("unit").unwrap(),
            MetaValue::from("bar")
        );

        let format = FormatLog::new(dst.clone(), name("tank"));
        assert_eq!(format.current().unwrap().as_deref(), Some("%.2f"));
        let hints: Vec<_> = format.history().unwrap().into_iter().map(|(_, hint)| hint).collect();
        assert_eq!(hints, vec![VALUE_CODEC.to_string(), "%.2f".to_string()]);
    }

    #[test]
    fn test_move_keeps_format_log_on_source() {
        let (src, dst) = (seeded(), engine());
        FormatLog::new(src.clone(), name("tank")).record("%.1f").unwrap();
        CopyMoveService::move_sensor(&src, &dst, &name("tank"), &TransferOptions::default()).unwrap();

        assert_eq!(FormatLog::new(src, name("tank")).current().unwrap().as_deref(), Some("%.1f"));
        assert_eq!(FormatLog::new(dst, name("tank")).current().unwrap().as_deref(), Some("%.1f"));
    }

    #[test]
    fn test_copy_range_without_metadata() {
        let (src, dst) = (seeded(), engine());
        let options = TransferOptions::builder()
            .range(TimeRange::between(at(1), at(3)))
            .include_metadata(false)
            .include_notes(false)
            .build();
        let report = CopyMoveService::copy(&src, &dst, &name("tank"), &options).unwrap();

        assert_eq!((report.readings, report.metadata, report.notes), (2, 0, 0));
        assert_eq!(values(&dst, "tank"), vec![1.0, 2.0]);
        assert!(MetadataCollection::new(dst, name("tank")).all().unwrap().is_empty());
    }

    #[test]
    fn test_copy_overwrites_destination() {
        let (src, dst) = (seeded(), engine());
        TimeSeriesCollection::new(dst.clone(), name("tank")).put(at(0), 99.0).unwrap();
        TimeSeriesCollection::new(dst.clone(), name("tank")).put(at(30), 30.0).unwrap();

        CopyMoveService::copy(&src, &dst, &name("tank"), &TransferOptions::default()).unwrap();
        assert_eq!(values(&dst, "tank"), vec![0.0, 1.0, 2.0, 3.0, 4.0, 30.0]);
    }

    #[test]
    fn test_move_across_stores() {
        let (src, dst) = (seeded(), engine());
        let options = TransferOptions::builder().range(TimeRange::since(at(3))).build();
        let report = CopyMoveService::move_sensor(&src, &dst, &name("tank"), &options).unwrap();

        assert!(report.moved);
        assert_eq!(values(&src, "tank"), vec![0.0, 1.0, 2.0]);
        assert_eq!(values(&dst, "tank"), vec![3.0, 4.0]);
        assert_eq!(MetadataCollection::new(src, name("tank")).get("unit").unwrap(), MetaValue::from("bar"));
    }

    #[test]
    fn test_move_does_not_drop_concurrent_overwrite() {
        let (src, dst) = (seeded(), engine());
        let series = TimeSeriesCollection::new(src.clone(), name("tank"));
        let options = TransferOptions::builder().range(TimeRange::between(at(2), at(3))).build();

        // Stall the move on the destination lock while a writer overwrites a
        // reading in the moved range.
        let blocker = dst.begin_write().unwrap();
        thread::scope(|s| {
            let mover = s.spawn(|| CopyMoveService::move_sensor(&src, &dst, &name("tank"), &options));
            thread::sleep(Duration::from_millis(50));
            let writer = s.spawn(|| series.put(at(2), 99.0));
            thread::sleep(Duration::from_millis(50));
            drop(blocker);

            assert!(mover.join().unwrap().unwrap().moved);
            writer.join().unwrap().unwrap();
        });

        let in_src = series.get(at(2)).ok();
        let in_dst = TimeSeriesCollection::new(dst.clone(), name("tank")).get(at(2)).ok();
        assert!(
            in_src == Some(99.0) || in_dst == Some(99.0),
            "overwritten reading lost: source {in_src:?}, destination {in_dst:?}"
        );
    }

    #[test]
    fn test_move_equals_copy_then_delete() {
        let (src_a, dst_a) = (seeded(), engine());
        let (src_b, dst_b) = (seeded(), engine());
        let range = TimeRange::between(at(1), at(4));
        let options = TransferOptions::builder().range(range).build();

        CopyMoveService::move_sensor(&src_a, &dst_a, &name("tank"), &options).unwrap();

        CopyMoveService::copy(&src_b, &dst_b, &name("tank"), &options).unwrap();
        TimeSeriesCollection::new(src_b.clone(), name("tank")).delete_range(range).unwrap();

        assert_eq!(values(&src_a, "tank"), values(&src_b, "tank"));
        assert_eq!(values(&dst_a, "tank"), values(&dst_b, "tank"));
    }

    #[test]
    fn test_move_within_store_renames() {
        let engine = seeded();
        let options = TransferOptions::builder().dest_sensor(name("tank2")).build();
        let report = CopyMoveService::move_sensor(&engine, &engine, &name("tank"), &options).unwrap();

        assert_eq!(report.dest_sensor, name("tank2"));
        assert!(values(&engine, "tank").is_empty());
        assert_eq!(values(&engine, "tank2"), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        let notes = AnnotationStore::new(engine.clone());
        assert_eq!(notes.get(&NoteScope::Sensor(name("tank2")), at(1)).unwrap(), "refilled");
        assert!(notes.get(&NoteScope::Sensor(name("tank")), at(1)).is_err());
    }

    #[test]
    fn test_same_source_and_destination_rejected() {
        let engine = seeded();
        let err = CopyMoveService::copy(&engine, &engine.clone(), &name("tank"), &TransferOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::SameSourceAndDestination { .. }));
        assert_eq!(values(&engine, "tank").len(), 5);
    }

    #[test]
    fn test_unknown_sensor() {
        let (src, dst) = (seeded(), engine());
        let err = CopyMoveService::copy(&src, &dst, &name("ghost"), &TransferOptions::default()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownSensor { .. }));

        let err = CopyMoveService::move_sensor(&src, &src, &name("ghost"), &TransferOptions {
            dest_sensor: Some(name("other")),
            ..TransferOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::UnknownSensor { .. }));
    }

    #[test]
    fn test_failed_removal_is_partial_move() {
        let copied = TransferReport {
            sensor: name("tank"),
            dest_sensor: name("tank"),
            readings: 7,
            metadata: 0,
            notes: 0,
            moved: false,
        };
        let failure = Err(StoreError::Transaction {
            source: redb::TransactionError::Storage(redb::StorageError::Io(std::io::Error::other("disk full"))),
        });

        let err = finish_move(copied.clone(), failure).unwrap_err();
        assert_eq!(err.code(), ErrorCode::PartialMove);
        assert!(matches!(err, StoreError::PartialMove { copied: 7, .. }));
        assert!(!err.is_fatal());

        let done = finish_move(copied, Ok(())).unwrap();
        assert!(done.moved);
    }
}
