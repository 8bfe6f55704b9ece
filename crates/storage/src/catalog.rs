//! Sensor catalog: listing, statistics and removal of whole sensors.

use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use redb::{ReadableTableMetadata, TableHandle};
use sensordb_types::{MetaValue, SensorName};
use serde::Serialize;
use snafu::ResultExt;
use tracing::info;

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, Result, StorageSnafu},
    format, metadata,
    series::{first_in, last_in},
    tables::{self, CollectionId, Role},
};

/// Summary of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStatistics {
    /// Sensor name.
    pub sensor: SensorName,
    /// Number of readings.
    pub entries: u64,
    /// Timestamp of the first reading.
    pub since: Option<DateTime<Utc>>,
    /// Timestamp of the last reading.
    pub until: Option<DateTime<Utc>>,
    /// Decoded metadata properties.
    pub metadata: BTreeMap<String, MetaValue>,
    /// Current format hint.
    pub format: Option<String>,
}

/// Summary of a whole store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStatistics {
    /// Store file, `None` for in-memory stores.
    pub path: Option<PathBuf>,
    /// File size in bytes.
    pub file_size: u64,
    /// Per-sensor summaries, ordered by name.
    pub sensors: Vec<SensorStatistics>,
}

/// Sensor-level view of one store.
#[derive(Debug, Clone)]
pub struct SensorCatalog {
    engine: StorageEngine,
}

impl SensorCatalog {
    pub(crate) fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Every sensor that has a data collection, ordered by name.
    pub fn list_sensors(&self) -> Result<Vec<SensorName>> {
        let txn = self.engine.begin_read()?;
        let mut sensors: Vec<SensorName> = txn
            .list_tables()
            .context(StorageSnafu)?
            .filter_map(|handle| match CollectionId::parse(handle.name()) {
                Some(CollectionId::Sensor { sensor, role: Role::Data }) => Some(sensor),
                _ => None,
            })
            .collect();
        sensors.sort();
        Ok(sensors)
    }

    /// Whether `sensor` has collections in the store.
    pub fn sensor_exists(&self, sensor: &SensorName) -> Result<bool> {
        let txn = self.engine.begin_read()?;
        let name = CollectionId::sensor(sensor, Role::Data).name();
        Ok(tables::open_read(&txn, &name)?.is_some())
    }

    /// Sensors with at least one reading.
    pub fn non_empty_sensors(&self) -> Result<Vec<SensorName>> {
        let txn = self.engine.begin_read()?;
        let mut non_empty = Vec::new();
        for sensor in self.list_sensors()? {
            let name = CollectionId::sensor(&sensor, Role::Data).name();
            if let Some(table) = tables::open_read(&txn, &name)? {
                if !table.is_empty().context(StorageSnafu)? {
                    non_empty.push(sensor);
                }
            }
        }
        Ok(non_empty)
    }

    /// Drops all four collections of `sensor` in one transaction.
    ///
    /// Returns whether the sensor existed. The file does not shrink.
    pub fn delete_sensor(&self, sensor: &SensorName) -> Result<bool> {
        let txn = self.engine.begin_write()?;
        let existed = tables::drop_sensor_collections(&txn, sensor)?;
        txn.commit().context(CommitSnafu)?;
        if existed {
            info!(sensor = %sensor, "Deleted sensor");
        }
        Ok(existed)
    }

    /// Statistics of every sensor, read from a single snapshot.
    pub fn statistics(&self) -> Result<StoreStatistics> {
        let sensors = self.list_sensors()?;
        let txn = self.engine.begin_read()?;
        let mut summaries = Vec::with_capacity(sensors.len());

        for sensor in sensors {
            let data_name = CollectionId::sensor(&sensor, Role::Data).name();
            let (entries, since, until) = match tables::open_read(&txn, &data_name)? {
                Some(table) => (
                    table.len().context(StorageSnafu)?,
                    first_in(&data_name, &table)?.map(|r| r.timestamp),
                    last_in(&data_name, &table)?.map(|r| r.timestamp),
                ),
                None => (0, None, None),
            };
            let metadata = match tables::open_read(&txn, &CollectionId::sensor(&sensor, Role::Meta).name())? {
                Some(table) => metadata::all_in(&sensor, &table)?.properties,
                None => BTreeMap::new(),
            };
            let format = match tables::open_read(&txn, &CollectionId::sensor(&sensor, Role::Format).name())? {
                Some(table) => format::current_in(&table)?,
                None => None,
            };
            summaries.push(SensorStatistics { sensor, entries, since, until, metadata, format });
        }

        Ok(StoreStatistics {
            path: self.engine.path().map(|p| p.to_path_buf()),
            file_size: self.engine.file_size()?,
            sensors: summaries,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use chrono::TimeZone;
    use sensordb_types::config::StoreConfig;

    use super::*;
    use crate::{format::VALUE_CODEC, metadata::MetadataCollection, series::TimeSeriesCollection};

    fn name(s: &str) -> SensorName {
        SensorName::new(s).unwrap()
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn test_list_and_exists() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let catalog = SensorCatalog::new(engine.clone());
        assert!(catalog.list_sensors().unwrap().is_empty());

        TimeSeriesCollection::new(engine.clone(), name("b")).put(at(0), 1.0).unwrap();
        MetadataCollection::new(engine.clone(), name("a"))
            .set("unit", &MetaValue::from("bar"))
            .unwrap();

        assert_eq!(catalog.list_sensors().unwrap(), vec![name("a"), name("b")]);
        assert!(catalog.sensor_exists(&name("a")).unwrap());
        assert!(!catalog.sensor_exists(&name("c")).unwrap());
        assert_eq!(catalog.non_empty_sensors().unwrap(), vec![name("b")]);
    }

    #[test]
    fn test_delete_sensor() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let catalog = SensorCatalog::new(engine.clone());
        let series = TimeSeriesCollection::new(engine.clone(), name("tank"));
        series.put(at(0), 1.0).unwrap();

        assert!(catalog.delete_sensor(&name("tank")).unwrap());
        assert!(!catalog.sensor_exists(&name("tank")).unwrap());
        assert!(series.is_empty().unwrap());
        assert!(!catalog.delete_sensor(&name("tank")).unwrap());
    }

    #[test]
    fn test_statistics() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let catalog = SensorCatalog::new(engine.clone());
        let series = TimeSeriesCollection::new(engine.clone(), name("tank"));
        series.put(at(3), 3.0).unwrap();
        series.put(at(1), 1.0).unwrap();
        MetadataCollection::new(engine.clone(), name("tank"))
            .set("unit", &MetaValue::from("bar"))
            .unwrap();

        let stats = catalog.statistics().unwrap();
        assert_eq!(stats.path, None);
        assert_eq!(stats.sensors.len(), 1);
        let tank = &stats.sensors[0];
        assert_eq!(tank.entries, 2);
        assert_eq!(tank.since, Some(at(1)));
        assert_eq!(tank.until, Some(at(3)));
        assert_eq!(tank.metadata.get("unit"), Some(&MetaValue::from("bar")));
        assert_eq!(tank.format.as_deref(), Some(VALUE_CODEC));
    }
}
