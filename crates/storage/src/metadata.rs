//! Metadata collection: per-sensor properties stored as YAML text.

use std::collections::BTreeMap;

use redb::{ReadableTable, Table};
use sensordb_types::{DisplayConfig, MetaValue, SensorName, validation::validate_key_name};
use serde::Serialize;
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, InvalidNameSnafu, Result, StorageSnafu, StoreError, TableSnafu},
    tables::{self, CollectionId, Role, definition},
};

/// All metadata of one sensor.
///
/// Properties that fail to decode are reported in `malformed` instead of
/// failing the whole read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorMetadata {
    /// Decoded properties.
    pub properties: BTreeMap<String, MetaValue>,
    /// Property name → decode error, for properties that are not valid YAML.
    pub malformed: BTreeMap<String, String>,
}

impl SensorMetadata {
    /// Decoded value of `property`.
    pub fn get(&self, property: &str) -> Option<&MetaValue> {
        self.properties.get(property)
    }

    /// Display configuration derived from the recognized properties.
    pub fn display_config(&self, sensor: &SensorName) -> DisplayConfig {
        DisplayConfig::from_properties(sensor, &self.properties)
    }

    /// Whether the sensor has no metadata at all.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.malformed.is_empty()
    }
}

pub(crate) fn encode_property(value: &MetaValue) -> Result<String> {
    value.to_yaml().map_err(|e| StoreError::Serialization { message: e.to_string() })
}

fn decode_property(sensor: &SensorName, property: &str, bytes: &[u8]) -> Result<MetaValue> {
    let malformed = |message: String| StoreError::MalformedMetadata {
        sensor: sensor.to_string(),
        property: property.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;
    MetaValue::from_yaml(text).map_err(|e| malformed(e.to_string()))
}

pub(crate) fn set_in(
    table: &mut Table<'_, &'static str, &'static [u8]>,
    property: &str,
    value: &MetaValue,
) -> Result<()> {
    let yaml = encode_property(value)?;
    table.insert(property, yaml.as_bytes()).context(StorageSnafu)?;
    Ok(())
}

/// Metadata properties of one sensor.
#[derive(Debug, Clone)]
pub struct MetadataCollection {
    engine: StorageEngine,
    sensor: SensorName,
}

impl MetadataCollection {
    pub(crate) fn new(engine: StorageEngine, sensor: SensorName) -> Self {
        Self { engine, sensor }
    }

    fn name(&self) -> String {
        CollectionId::sensor(&self.sensor, Role::Meta).name()
    }

    /// Sets `property` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for empty or control-character
    /// property names.
    pub fn set(&self, property: &str, value: &MetaValue) -> Result<()> {
        validate_key_name(property, "property").context(InvalidNameSnafu)?;
        let name = self.name();
        let txn = self.engine.begin_write()?;
        {
            tables::ensure_sensor_collections(&txn, &self.sensor)?;
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            set_in(&mut table, property, value)?;
        }
        txn.commit().context(CommitSnafu)?;
        debug!(sensor = %self.sensor, property, "Set metadata");
        Ok(())
    }

    /// Parses `yaml` and stores it under `property`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if `yaml` is not a supported
    /// YAML value.
    pub fn set_yaml(&self, property: &str, yaml: &str) -> Result<()> {
        let value = MetaValue::from_yaml(yaml)
            .map_err(|e| StoreError::Serialization { message: e.to_string() })?;
        self.set(property, &value)
    }

    /// Value of `property`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the property is unset and
    /// [`StoreError::MalformedMetadata`] if the stored text is not valid YAML.
    pub fn get(&self, property: &str) -> Result<MetaValue> {
        let name = self.name();
        let txn = self.engine.begin_read()?;
        let not_found = || StoreError::NotFound { collection: name.clone(), key: property.to_string() };
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Err(not_found());
        };
        match table.get(property).context(StorageSnafu)? {
            Some(bytes) => decode_property(&self.sensor, property, bytes.value()),
            None => Err(not_found()),
        }
    }

    /// Removes `property`. Returns whether it was set.
    pub fn remove(&self, property: &str) -> Result<bool> {
        let name = self.name();
        let txn = self.engine.begin_write()?;
        if !tables::exists_in(&txn, &name)? {
            return Ok(false);
        }
        let removed = {
            let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
            table.remove(property).context(StorageSnafu)?.is_some()
        };
        txn.commit().context(CommitSnafu)?;
        Ok(removed)
    }

    /// Every property of the sensor.
    ///
    /// A malformed property is logged and reported in
    /// [`SensorMetadata::malformed`]; the other properties are still returned.
    pub fn all(&self) -> Result<SensorMetadata> {
        let txn = self.engine.begin_read()?;
        match tables::open_read(&txn, &self.name())? {
            Some(table) => all_in(&self.sensor, &table),
            None => Ok(SensorMetadata::default()),
        }
    }
}

/// Reads every property of an open metadata collection.
pub(crate) fn all_in(
    sensor: &SensorName,
    table: &impl ReadableTable<&'static str, &'static [u8]>,
) -> Result<SensorMetadata> {
    let mut metadata = SensorMetadata::default();
    for entry in table.range::<&str>(..).context(StorageSnafu)? {
        let (key, value) = entry.context(StorageSnafu)?;
        let property = key.value();
        match decode_property(sensor, property, value.value()) {
            Ok(value) => {
                metadata.properties.insert(property.to_string(), value);
            },
            Err(e) => {
                warn!(sensor = %sensor, property, error = %e, "Malformed metadata property");
                metadata.malformed.insert(property.to_string(), e.to_string());
            },
        }
    }
    Ok(metadata)
}
