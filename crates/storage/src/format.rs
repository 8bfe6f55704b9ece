//! Per-sensor format hint log.
//!
//! `format_{sensor}` maps timestamps to formatting hints. The latest entry is
//! the current hint. A new entry is written only when the hint changes.

use chrono::{DateTime, TimeDelta, Utc};
use redb::{ReadableTable, Table};
use sensordb_types::{SensorName, truncate_to_micros};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, Result, StorageSnafu, StoreError, TableSnafu},
    keys::{decode_timestamp, encode_timestamp},
    tables::{self, CollectionId, ReadCollection, Role, definition},
};

/// Identifier of the reading value codec: one little-endian `f64`.
pub const VALUE_CODEC: &str = "<d";

/// Appends `hint` at `timestamp` unless it equals the current hint.
///
/// Entries stay strictly ordered: a `timestamp` at or before the latest entry
/// is moved one microsecond past it. Returns whether an entry was written.
pub(crate) fn record_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    timestamp: DateTime<Utc>,
    hint: &str,
) -> Result<bool> {
    let latest = match table.last().context(StorageSnafu)? {
        Some((key, value)) => {
            Some((decode_timestamp("format log", key.value())?, decode_hint(value.value())?))
        },
        None => None,
    };

    let mut timestamp = truncate_to_micros(timestamp);
    if let Some((at, current)) = latest {
        if current == hint {
            return Ok(false);
        }
        if at >= timestamp {
            timestamp = at + TimeDelta::microseconds(1);
        }
    }
    let key = encode_timestamp(timestamp)?;
    table.insert(key.as_str(), hint.as_bytes()).context(StorageSnafu)?;
    Ok(true)
}

pub(crate) fn decode_hint(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StoreError::Corrupted { message: format!("format hint is not UTF-8: {e}") })
}

/// Format hint history of one sensor.
#[derive(Debug, Clone)]
pub struct FormatLog {
    engine: StorageEngine,
    sensor: SensorName,
}

impl FormatLog {
    pub(crate) fn new(engine: StorageEngine, sensor: SensorName) -> Self {
        Self { engine, sensor }
    }

    fn name(&self) -> String {
        CollectionId::sensor(&self.sensor, Role::Format).name()
    }

    /// Records `hint` now if it differs from the current one.
    pub fn record(&self, hint: &str) -> Result<bool> {
        let txn = self.engine.begin_write()?;
        let written = {
            tables::ensure_sensor_collections(&txn, &self.sensor)?;
            let name = self.name();
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            record_in(&mut table, Utc::now(), hint)?
        };
        txn.commit().context(CommitSnafu)?;
        if written {
            debug!(sensor = %self.sensor, hint, "Recorded format hint");
        }
        Ok(written)
    }

    /// Current hint, `None` for sensors that were never written.
    pub fn current(&self) -> Result<Option<String>> {
        let txn = self.engine.begin_read()?;
        match tables::open_read(&txn, &self.name())? {
            Some(table) => current_in(&table),
            None => Ok(None),
        }
    }

    /// Every recorded hint, oldest first.
    pub fn history(&self) -> Result<Vec<(DateTime<Utc>, String)>> {
        let txn = self.engine.begin_read()?;
        let name = self.name();
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Ok(Vec::new());
        };
        let mut entries = Vec::new();
        for result in table.range::<&str>(..).context(StorageSnafu)? {
            let (key, value) = result.context(StorageSnafu)?;
            entries.push((decode_timestamp(&name, key.value())?, decode_hint(value.value())?));
        }
        Ok(entries)
    }
}

/// Current hint of an open format collection.
pub(crate) fn current_in(table: &ReadCollection) -> Result<Option<String>> {
    match table.last().context(StorageSnafu)? {
        Some((_, value)) => Ok(Some(decode_hint(value.value())?)),
        None => Ok(None),
    }
}
