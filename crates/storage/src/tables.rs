//! Collection namespace for redb storage.
//!
//! Every collection is a redb table keyed by `&str` with raw byte values.
//! Per-sensor collections are named `{role}_{sensor}`:
//!
//! | Table            | Key                  | Value                       |
//! |------------------|----------------------|-----------------------------|
//! | `data_{sensor}`  | timestamp (27 bytes) | `f64`, 8 bytes little-endian|
//! | `meta_{sensor}`  | property name        | YAML text                   |
//! | `notes_{sensor}` | timestamp            | UTF-8 text                  |
//! | `format_{sensor}`| timestamp            | format hint, UTF-8          |
//! | `notes`          | timestamp            | UTF-8 text                  |
//! | `plot_groups`    | group name           | YAML list of sensor names   |
//!
//! The four per-sensor tables are created together by
//! [`ensure_sensor_collections`] inside the write transaction that first
//! touches the sensor.

use std::fmt;

use chrono::Utc;
use redb::{ReadOnlyTable, ReadTransaction, ReadableTableMetadata, TableDefinition, TableError, TableHandle, WriteTransaction};
use sensordb_types::SensorName;
use snafu::ResultExt;
use tracing::debug;

use crate::{
    error::{Result, StorageSnafu, StoreError, TableSnafu},
    format::{self, VALUE_CODEC},
};

/// Table type shared by every collection.
pub type Collection<'a> = TableDefinition<'a, &'static str, &'static [u8]>;

/// Read-only handle on a collection, pinned to one snapshot.
pub type ReadCollection = ReadOnlyTable<&'static str, &'static [u8]>;

/// Fixed table definitions.
pub struct Tables;

impl Tables {
    /// Store-wide notes: timestamp → text.
    pub const GLOBAL_NOTES: Collection<'static> = TableDefinition::new("notes");

    /// Plot groups: group name → YAML list of sensor names.
    pub const PLOT_GROUPS: Collection<'static> = TableDefinition::new("plot_groups");
}

/// Role of a per-sensor collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Readings.
    Data,
    /// Metadata properties.
    Meta,
    /// Sensor annotations.
    Notes,
    /// Format hint history.
    Format,
}

impl Role {
    /// All roles, in creation order.
    pub const ALL: [Role; 4] = [Role::Data, Role::Meta, Role::Notes, Role::Format];

    /// Table name prefix, including the separator.
    pub const fn prefix(self) -> &'static str {
        match self {
            Role::Data => "data_",
            Role::Meta => "meta_",
            Role::Notes => "notes_",
            Role::Format => "format_",
        }
    }
}

/// Typed identity of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CollectionId {
    /// A per-sensor collection.
    Sensor { sensor: SensorName, role: Role },
    /// The store-wide `notes` collection.
    GlobalNotes,
    /// The store-wide `plot_groups` collection.
    PlotGroups,
}

impl CollectionId {
    /// Per-sensor collection id.
    pub fn sensor(sensor: &SensorName, role: Role) -> Self {
        Self::Sensor { sensor: sensor.clone(), role }
    }

    /// Table name.
    pub fn name(&self) -> String {
        match self {
            Self::Sensor { sensor, role } => format!("{}{}", role.prefix(), sensor),
            Self::GlobalNotes => Tables::GLOBAL_NOTES.name().to_string(),
            Self::PlotGroups => Tables::PLOT_GROUPS.name().to_string(),
        }
    }

    /// Parses a table name back into a collection id.
    ///
    /// Returns `None` for tables this crate does not own.
    pub fn parse(name: &str) -> Option<Self> {
        if name == Tables::GLOBAL_NOTES.name() {
            return Some(Self::GlobalNotes);
        }
        if name == Tables::PLOT_GROUPS.name() {
            return Some(Self::PlotGroups);
        }
        Role::ALL.into_iter().find_map(|role| {
            let sensor = name.strip_prefix(role.prefix())?;
            SensorName::new(sensor).ok().map(|sensor| Self::Sensor { sensor, role })
        })
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Table definition for a dynamically named collection.
pub fn definition(name: &str) -> Collection<'_> {
    TableDefinition::new(name)
}

/// Opens a collection for reading, `None` if it was never created.
pub fn open_read(txn: &ReadTransaction, name: &str) -> Result<Option<ReadCollection>> {
    match txn.open_table(definition(name)) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(source) => Err(StoreError::Table { source }),
    }
}

/// Whether a collection exists, as seen from a write transaction.
pub fn exists_in(txn: &WriteTransaction, name: &str) -> Result<bool> {
    Ok(txn.list_tables().context(StorageSnafu)?.any(|handle| handle.name() == name))
}

/// Creates all four collections of `sensor` if absent.
///
/// Must run inside the write transaction that performs the first write for
/// the sensor so that readers never observe a partially created sensor. On
/// creation the value codec is recorded in the format log.
pub fn ensure_sensor_collections(txn: &WriteTransaction, sensor: &SensorName) -> Result<()> {
    for role in [Role::Data, Role::Meta, Role::Notes] {
        let name = CollectionId::sensor(sensor, role).name();
        txn.open_table(definition(&name)).context(TableSnafu)?;
    }

    let name = CollectionId::sensor(sensor, Role::Format).name();
    let mut table = txn.open_table(definition(&name)).context(TableSnafu)?;
    if table.is_empty().context(StorageSnafu)? {
        debug!(sensor = %sensor, "Creating sensor collections");
        format::record_in(&mut table, Utc::now(), VALUE_CODEC)?;
    }
    Ok(())
}

/// Drops all four collections of `sensor`. Returns whether any existed.
pub fn drop_sensor_collections(txn: &WriteTransaction, sensor: &SensorName) -> Result<bool> {
    let mut existed = false;
    for role in Role::ALL {
        let name = CollectionId::sensor(sensor, role).name();
        existed |= txn.delete_table(definition(&name)).context(TableSnafu)?;
    }
    Ok(existed)
}
