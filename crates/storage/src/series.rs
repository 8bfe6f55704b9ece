//! Time-series collection: readings of one sensor.
//!
//! Values are stored as raw 8-byte little-endian IEEE-754 doubles with no
//! type tag, so every bit pattern (including `NaN` payloads and infinities)
//! survives a round-trip. Keys are encoded by [`crate::keys`].

use chrono::{DateTime, TimeDelta, Utc};
use redb::{ReadableTable, ReadableTableMetadata, Table};
use sensordb_types::{Reading, SensorName, TimeRange, parse_timestamp};
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    engine::StorageEngine,
    error::{
        CommitSnafu, InvalidTimestampSnafu, Result, StorageSnafu, StoreError, TableSnafu,
    },
    keys::{decode_timestamp, encode_timestamp},
    scan::TimeScan,
    tables::{self, CollectionId, Role, definition},
};

/// Encoded size of a value.
pub const VALUE_LEN: usize = 8;

/// Lazy scan over readings.
pub type Scan = TimeScan<Reading>;

/// Encodes a value for storage.
pub fn encode_value(value: f64) -> [u8; VALUE_LEN] {
    value.to_le_bytes()
}

/// Decodes a stored value.
///
/// # Errors
///
/// Returns [`StoreError::Corrupted`] if the value is not exactly 8 bytes.
pub fn decode_value(collection: &str, bytes: &[u8]) -> Result<f64> {
    let raw: [u8; VALUE_LEN] = bytes.try_into().map_err(|_| StoreError::Corrupted {
        message: format!("value of {} bytes in {collection}, expected {VALUE_LEN}", bytes.len()),
    })?;
    Ok(f64::from_le_bytes(raw))
}

pub(crate) fn decode_reading(collection: &str, key: &str, value: &[u8]) -> Result<Reading> {
    Ok(Reading { timestamp: decode_timestamp(collection, key)?, value: decode_value(collection, value)? })
}

/// Inserts or overwrites one reading.
pub(crate) fn insert_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    timestamp: DateTime<Utc>,
    value: f64,
) -> Result<()> {
    let key = encode_timestamp(timestamp)?;
    table.insert(key.as_str(), &encode_value(value)[..]).context(StorageSnafu)?;
    Ok(())
}

/// First reading of an open data collection.
pub(crate) fn first_in(
    collection: &str,
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<Option<Reading>> {
    match table.first().context(StorageSnafu)? {
        Some((key, value)) => Ok(Some(decode_reading(collection, key.value(), value.value())?)),
        None => Ok(None),
    }
}

/// Last reading of an open data collection.
pub(crate) fn last_in(
    collection: &str,
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<Option<Reading>> {
    match table.last().context(StorageSnafu)? {
        Some((key, value)) => Ok(Some(decode_reading(collection, key.value(), value.value())?)),
        None => Ok(None),
    }
}

/// Readings of one sensor.
///
/// Every mutation runs in its own write transaction and creates the sensor's
/// collections on first use. Reads that find no collection behave as if the
/// sensor had no readings.
#[derive(Debug, Clone)]
pub struct TimeSeriesCollection {
    engine: StorageEngine,
    sensor: SensorName,
}

impl TimeSeriesCollection {
    pub(crate) fn new(engine: StorageEngine, sensor: SensorName) -> Self {
        Self { engine, sensor }
    }

    /// Sensor this collection belongs to.
    pub fn sensor(&self) -> &SensorName {
        &self.sensor
    }

    /// Table name (`data_{sensor}`).
    pub fn name(&self) -> String {
        CollectionId::sensor(&self.sensor, Role::Data).name()
    }

    /// Inserts or overwrites the reading at `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTimestamp`] for timestamps outside the
    /// encodable range.
    pub fn put(&self, timestamp: DateTime<Utc>, value: f64) -> Result<()> {
        let name = self.name();
        let txn = self.engine.begin_write()?;
        {
            tables::ensure_sensor_collections(&txn, &self.sensor)?;
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            insert_in(&mut table, timestamp, value)?;
        }
        txn.commit().context(CommitSnafu)?;
        debug!(sensor = %self.sensor, %timestamp, value, "Wrote reading");
        Ok(())
    }

    /// Parses `timestamp` and inserts the reading.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidTimestamp`] when the text is unparseable
    /// or carries no timezone.
    pub fn put_str(&self, timestamp: &str, value: f64) -> Result<()> {
        let timestamp = parse_timestamp(timestamp).context(InvalidTimestampSnafu)?;
        self.put(timestamp, value)
    }

    /// Inserts many readings in one transaction. Returns the number written.
    pub fn put_many(&self, readings: &[Reading]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }
        let name = self.name();
        let txn = self.engine.begin_write()?;
        {
            tables::ensure_sensor_collections(&txn, &self.sensor)?;
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            for reading in readings {
                insert_in(&mut table, reading.timestamp, reading.value)?;
            }
        }
        txn.commit().context(CommitSnafu)?;
        debug!(sensor = %self.sensor, count = readings.len(), "Wrote readings");
        Ok(readings.len())
    }

    /// Writes the reading unless the reading at or before `timestamp` holds a
    /// bit-identical value.
    ///
    /// With `max_age`, an unchanged value is still written once the previous
    /// reading is older than `max_age`, so slow-changing sensors keep
    /// producing fresh readings. Returns whether a write happened.
    pub fn put_if_changed(
        &self,
        timestamp: DateTime<Utc>,
        value: f64,
        max_age: Option<TimeDelta>,
    ) -> Result<bool> {
        let name = self.name();
        let key = encode_timestamp(timestamp)?;
        let txn = self.engine.begin_write()?;
        {
            tables::ensure_sensor_collections(&txn, &self.sensor)?;
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;

            let previous = match table.range::<&str>(..=key.as_str()).context(StorageSnafu)?.next_back() {
                Some(entry) => {
                    let (k, v) = entry.context(StorageSnafu)?;
                    Some(decode_reading(&name, k.value(), v.value())?)
                },
                None => None,
            };

            if let Some(previous) = previous {
                let unchanged = previous.value.to_bits() == value.to_bits();
                let fresh = max_age.is_none_or(|age| timestamp - previous.timestamp <= age);
                if unchanged && fresh {
                    return Ok(false);
                }
            }
            insert_in(&mut table, timestamp, value)?;
        }
        txn.commit().context(CommitSnafu)?;
        debug!(sensor = %self.sensor, %timestamp, value, "Wrote changed reading");
        Ok(true)
    }

    /// Value at exactly `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no reading has that timestamp.
    pub fn get(&self, timestamp: DateTime<Utc>) -> Result<f64> {
        let name = self.name();
        let key = encode_timestamp(timestamp)?;
        let txn = self.engine.begin_read()?;
        let not_found = || StoreError::NotFound { collection: name.clone(), key: key.clone() };
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Err(not_found());
        };
        match table.get(key.as_str()).context(StorageSnafu)? {
            Some(value) => decode_value(&name, value.value()),
            None => Err(not_found()),
        }
    }

    /// Lazy ascending scan of `[range.since, range.until)`, at most `limit`
    /// readings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRange`] if `since` is after `until`.
    pub fn scan(&self, range: TimeRange, limit: Option<usize>) -> Result<Scan> {
        check_range(&range)?;
        let name = self.name();
        let txn = self.engine.begin_read()?;
        let table = tables::open_read(&txn, &name)?;
        TimeScan::new(name, table, &range, limit, self.engine.config().scan_batch_size, decode_reading)
    }

    /// Earliest reading.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyCollection`] when there are no readings.
    pub fn first(&self) -> Result<Reading> {
        let name = self.name();
        let txn = self.engine.begin_read()?;
        let reading = match tables::open_read(&txn, &name)? {
            Some(table) => first_in(&name, &table)?,
            None => None,
        };
        reading.ok_or(StoreError::EmptyCollection { collection: name })
    }

    /// Latest reading.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyCollection`] when there are no readings.
    pub fn last(&self) -> Result<Reading> {
        let name = self.name();
        let txn = self.engine.begin_read()?;
        let reading = match tables::open_read(&txn, &name)? {
            Some(table) => last_in(&name, &table)?,
            None => None,
        };
        reading.ok_or(StoreError::EmptyCollection { collection: name })
    }

    /// Number of readings.
    pub fn len(&self) -> Result<u64> {
        let txn = self.engine.begin_read()?;
        match tables::open_read(&txn, &self.name())? {
            Some(table) => table.len().context(StorageSnafu),
            None => Ok(0),
        }
    }

    /// Whether the sensor has no readings.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// First reading of the latest run of identical values, i.e. the moment
    /// the current value was first observed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmptyCollection`] when there are no readings.
    pub fn last_changed(&self) -> Result<Reading> {
        let name = self.name();
        let txn = self.engine.begin_read()?;
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Err(StoreError::EmptyCollection { collection: name });
        };

        let mut run_start: Option<Reading> = None;
        for entry in table.range::<&str>(..).context(StorageSnafu)?.rev() {
            let (key, value) = entry.context(StorageSnafu)?;
            let reading = decode_reading(&name, key.value(), value.value())?;
            match run_start {
                Some(start) if start.value.to_bits() != reading.value.to_bits() => break,
                _ => run_start = Some(reading),
            }
        }
        run_start.ok_or(StoreError::EmptyCollection { collection: name })
    }

    /// Removes every reading in `[range.since, range.until)`. Returns the
    /// number removed.
    ///
    /// Removed entries free pages inside the file but never shrink it.
    pub fn delete_range(&self, range: TimeRange) -> Result<usize> {
        check_range(&range)?;
        let name = self.name();
        let since = range.since.map(encode_timestamp).transpose()?;
        let until = range.until.map(encode_timestamp).transpose()?;

        let txn = self.engine.begin_write()?;
        if !tables::exists_in(&txn, &name)? {
            return Ok(0);
        }
        let removed = {
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            let keys = keys_in(&table, since.as_deref(), until.as_deref())?;
            for key in &keys {
                table.remove(key.as_str()).context(StorageSnafu)?;
            }
            keys.len()
        };
        txn.commit().context(CommitSnafu)?;
        info!(sensor = %self.sensor, removed, "Deleted readings");
        Ok(removed)
    }
}

/// Keys of `table` in `[since, until)`.
pub(crate) fn keys_in(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    since: Option<&str>,
    until: Option<&str>,
) -> Result<Vec<String>> {
    use std::ops::Bound;

    if let (Some(since), Some(until)) = (since, until) {
        if since >= until {
            return Ok(Vec::new());
        }
    }
    let lower = since.map_or(Bound::Unbounded, Bound::Included);
    let upper = until.map_or(Bound::Unbounded, Bound::Excluded);
    let mut keys = Vec::new();
    for entry in table.range::<&str>((lower, upper)).context(StorageSnafu)? {
        let (key, _) = entry.context(StorageSnafu)?;
        keys.push(key.value().to_string());
    }
    Ok(keys)
}

pub(crate) fn check_range(range: &TimeRange) -> Result<()> {
    match (range.since, range.until) {
        (Some(since), Some(until)) if since > until => Err(StoreError::InvalidRange { since, until }),
        _ => Ok(()),
    }
}
