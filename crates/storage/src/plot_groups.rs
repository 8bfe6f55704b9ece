//! Plot groups: named lists of sensors that are plotted together.

use std::collections::BTreeMap;

use sensordb_types::{SensorName, validation::validate_key_name};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    engine::StorageEngine,
    error::{CommitSnafu, InvalidNameSnafu, Result, StorageSnafu, StoreError, TableSnafu},
    tables::{self, CollectionId, Tables},
};

fn decode_members(group: &str, bytes: &[u8]) -> Result<Vec<SensorName>> {
    serde_yml::from_slice(bytes).map_err(|e| StoreError::Serialization {
        message: format!("plot group {group:?}: {e}"),
    })
}

/// Store-wide plot group definitions.
#[derive(Debug, Clone)]
pub struct PlotGroups {
    engine: StorageEngine,
}

impl PlotGroups {
    pub(crate) fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Defines or replaces `group`.
    pub fn set(&self, group: &str, members: &[SensorName]) -> Result<()> {
        validate_key_name(group, "plot_group").context(InvalidNameSnafu)?;
        let yaml = serde_yml::to_string(members)
            .map_err(|e| StoreError::Serialization { message: e.to_string() })?;

        let txn = self.engine.begin_write()?;
        {
            let mut table = txn.open_table(Tables::PLOT_GROUPS).context(TableSnafu)?;
            table.insert(group, yaml.as_bytes()).context(StorageSnafu)?;
        }
        txn.commit().context(CommitSnafu)?;
        debug!(group, members = members.len(), "Set plot group");
        Ok(())
    }

    /// Members of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for undefined groups.
    pub fn get(&self, group: &str) -> Result<Vec<SensorName>> {
        let name = CollectionId::PlotGroups.name();
        let txn = self.engine.begin_read()?;
        let not_found = || StoreError::NotFound { collection: name.clone(), key: group.to_string() };
        let Some(table) = tables::open_read(&txn, &name)? else {
            return Err(not_found());
        };
        match table.get(group).context(StorageSnafu)? {
            Some(bytes) => decode_members(group, bytes.value()),
            None => Err(not_found()),
        }
    }

    /// Every group, by name.
    pub fn all(&self) -> Result<BTreeMap<String, Vec<SensorName>>> {
        let txn = self.engine.begin_read()?;
        let mut groups = BTreeMap::new();
        let Some(table) = tables::open_read(&txn, &CollectionId::PlotGroups.name())? else {
            return Ok(groups);
        };
        for entry in table.range::<&str>(..).context(StorageSnafu)? {
            let (key, value) = entry.context(StorageSnafu)?;
            groups.insert(key.value().to_string(), decode_members(key.value(), value.value())?);
        }
        Ok(groups)
    }

    /// Removes `group`. Returns whether it existed.
    pub fn remove(&self, group: &str) -> Result<bool> {
        let txn = self.engine.begin_write()?;
        let removed = {
            let mut table = txn.open_table(Tables::PLOT_GROUPS).context(TableSnafu)?;
            table.remove(group).context(StorageSnafu)?.is_some()
        };
        txn.commit().context(CommitSnafu)?;
        Ok(removed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use sensordb_types::config::StoreConfig;

    use super::*;

    fn groups() -> PlotGroups {
        PlotGroups::new(StorageEngine::in_memory(&StoreConfig::default()).unwrap())
    }

    fn names(list: &[&str]) -> Vec<SensorName> {
        list.iter().map(|n| SensorName::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_set_get() {
        let groups = groups();
        groups.set("pressures", &names(&["tank", "pump/out"])).unwrap();
        assert_eq!(groups.get("pressures").unwrap(), names(&["tank", "pump/out"]));
    }

    #[test]
    fn test_undefined_group() {
        let groups = groups();
        assert!(matches!(groups.get("nope"), Err(StoreError::NotFound { .. })));
        assert!(groups.all().unwrap().is_empty());
        assert!(!groups.remove("nope").unwrap());
    }

    #[test]
    fn test_all_and_remove() {
        let groups = groups();
        groups.set("a", &names(&["x"])).unwrap();
        groups.set("b", &names(&["y", "z"])).unwrap();
        let all = groups.all().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(groups.remove("a").unwrap());
        assert_eq!(groups.all().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_member_is_rejected_on_read() {
        let groups = groups();
        let txn = groups.engine.begin_write().unwrap();
        {
            let mut table = txn.open_table(Tables::PLOT_GROUPS).unwrap();
            table.insert("bad", &b"- ok\n- not ok\n"[..]).unwrap();
        }
        txn.commit().unwrap();
        assert!(matches!(groups.get("bad"), Err(StoreError::Serialization { .. })));
    }

    #[test]
    fn test_empty_group_name_rejected() {
        let err = groups().set("", &names(&["x"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName { .. }));
    }
}
