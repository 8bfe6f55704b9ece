//! Range query engine: multi-sensor reads from one snapshot.
//!
//! All sensors of a query are read from the same read transaction, so results
//! are mutually consistent even while writers commit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sensordb_types::{Reading, SensorName, TimeRange};
use serde::Serialize;
use tracing::debug;

use crate::{
    engine::StorageEngine,
    error::{Result, StoreError},
    scan::TimeScan,
    series::{check_range, decode_reading, last_in},
    tables::{self, CollectionId, Role},
};

/// Readings per sensor.
pub type QueryResult = BTreeMap<SensorName, Vec<Reading>>;

/// One row of a merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineRow {
    /// Row timestamp.
    pub timestamp: DateTime<Utc>,
    /// One value per sensor column; `None` where the sensor has no reading at
    /// this exact timestamp.
    pub values: Vec<Option<f64>>,
}

/// Readings of several sensors aligned on the union of their timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    /// Column order.
    pub sensors: Vec<SensorName>,
    /// Rows, ascending by timestamp.
    pub rows: Vec<TimelineRow>,
}

/// Aligns query results on the union of all timestamps.
///
/// No resampling or interpolation: a sensor without a reading at a row's
/// timestamp gets `None` in that column.
pub fn merge_timeline(results: &QueryResult) -> Timeline {
    let sensors: Vec<SensorName> = results.keys().cloned().collect();
    let timestamps: BTreeSet<DateTime<Utc>> =
        results.values().flatten().map(|reading| reading.timestamp).collect();

    let mut rows: Vec<TimelineRow> = timestamps
        .into_iter()
        .map(|timestamp| TimelineRow { timestamp, values: vec![None; sensors.len()] })
        .collect();

    for (column, readings) in results.values().enumerate() {
        // Both sides are sorted, so one forward pass places every reading.
        let mut row = 0;
        for reading in readings {
            while rows[row].timestamp < reading.timestamp {
                row += 1;
            }
            rows[row].values[column] = Some(reading.value);
        }
    }

    Timeline { sensors, rows }
}

/// Multi-sensor range queries over one store.
#[derive(Debug, Clone)]
pub struct RangeQueryEngine {
    engine: StorageEngine,
}

impl RangeQueryEngine {
    pub(crate) fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Readings of every sensor in `[range.since, range.until)`, at most
    /// `limit` per sensor.
    ///
    /// Sensors without readings in range map to an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSensor`] if any sensor has no collections
    /// and [`StoreError::InvalidRange`] if `since` is after `until`.
    pub fn query(&self, sensors: &[SensorName], range: TimeRange, limit: Option<usize>) -> Result<QueryResult> {
        check_range(&range)?;
        let txn = self.engine.begin_read()?;
        let batch_size = self.engine.config().scan_batch_size;

        let mut results = QueryResult::new();
        for sensor in sensors {
            if results.contains_key(sensor) {
                continue;
            }
            let name = CollectionId::sensor(sensor, Role::Data).name();
            let table = tables::open_read(&txn, &name)?
                .ok_or_else(|| StoreError::UnknownSensor { sensor: sensor.to_string() })?;
            let scan = TimeScan::new(name, Some(table), &range, limit, batch_size, decode_reading)?;
            results.insert(sensor.clone(), scan.collect::<Result<Vec<_>>>()?);
        }

        debug!(
            sensors = results.len(),
            readings = results.values().map(Vec::len).sum::<usize>(),
            "Range query"
        );
        Ok(results)
    }

    /// Latest reading of every sensor, `None` for sensors without readings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownSensor`] if any sensor has no collections.
    pub fn latest(&self, sensors: &[SensorName]) -> Result<BTreeMap<SensorName, Option<Reading>>> {
        let txn = self.engine.begin_read()?;
        let mut latest = BTreeMap::new();
        for sensor in sensors {
            let name = CollectionId::sensor(sensor, Role::Data).name();
            let table = tables::open_read(&txn, &name)?
                .ok_or_else(|| StoreError::UnknownSensor { sensor: sensor.to_string() })?;
            latest.insert(sensor.clone(), last_in(&name, &table)?);
        }
        Ok(latest)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use sensordb_types::config::StoreConfig;

    use super::*;
    use crate::series::TimeSeriesCollection;

    fn name(s: &str) -> SensorName {
        SensorName::new(s).unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn setup() -> (StorageEngine, RangeQueryEngine) {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let a = TimeSeriesCollection::new(engine.clone(), name("a"));
        let b = TimeSeriesCollection::new(engine.clone(), name("b"));
        for minute in [0, 2, 4] {
            a.put(at(minute), f64::from(minute)).unwrap();
        }
        for minute in [1, 2] {
            b.put(at(minute), f64::from(minute) * 10.0).unwrap();
        }
        (engine.clone(), RangeQueryEngine::new(engine))
    }

    #[test]
    fn test_query_fans_out() {
        let (_, query) = setup();
        let results = query.query(&[name("a"), name("b")], TimeRange::between(at(1), at(4)), None).unwrap();
        let a: Vec<f64> = results[&name("a")].iter().map(|r| r.value).collect();
        let b: Vec<f64> = results[&name("b")].iter().map(|r| r.value).collect();
        assert_eq!(a, vec![2.0]);
        assert_eq!(b, vec![10.0, 20.0]);
    }

    #[test]
    fn test_query_empty_range_maps_to_empty() {
        let (_, query) = setup();
        let results = query.query(&[name("a")], TimeRange::since(at(30)), None).unwrap();
        assert!(results[&name("a")].is_empty());
    }

    #[test]
    fn test_query_unknown_sensor() {
        let (_, query) = setup();
        let err = query.query(&[name("a"), name("ghost")], TimeRange::all(), None).unwrap_err();
        assert!(matches!(err, StoreError::UnknownSensor { ref sensor } if sensor == "ghost"));
    }

    #[test]
    fn test_query_limit_per_sensor() {
        let (_, query) = setup();
        let results = query.query(&[name("a"), name("b")], TimeRange::all(), Some(1)).unwrap();
        assert_eq!(results[&name("a")].len(), 1);
        assert_eq!(results[&name("b")].len(), 1);
    }

    #[test]
    fn test_latest() {
        let (engine, query) = setup();
        TimeSeriesCollection::new(engine.clone(), name("c")).put(at(0), 0.0).unwrap();
        TimeSeriesCollection::new(engine, name("c")).delete_range(TimeRange::all()).unwrap();

        let latest = query.latest(&[name("a"), name("b"), name("c")]).unwrap();
        assert_eq!(latest[&name("a")], Some(Reading::new(at(4), 4.0)));
        assert_eq!(latest[&name("b")], Some(Reading::new(at(2), 20.0)));
        assert_eq!(latest[&name("c")], None);
        assert!(query.latest(&[name("ghost")]).is_err());
    }

    #[test]
    fn test_merge_timeline() {
        let (_, query) = setup();
        let results = query.query(&[name("a"), name("b")], TimeRange::all(), None).unwrap();
        let timeline = merge_timeline(&results);

        assert_eq!(timeline.sensors, vec![name("a"), name("b")]);
        let rows: Vec<(u32, Vec<Option<f64>>)> = timeline
            .rows
            .iter()
            .map(|row| (chrono::Timelike::minute(&row.timestamp), row.values.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (0, vec![Some(0.0), None]),
                (1, vec![None, Some(10.0)]),
                (2, vec![Some(2.0), Some(20.0)]),
                (4, vec![Some(4.0), None]),
            ]
        );
    }

    #[test]
    fn test_merge_empty() {
        let timeline = merge_timeline(&QueryResult::new());
        assert!(timeline.sensors.is_empty());
        assert!(timeline.rows.is_empty());
    }
}
