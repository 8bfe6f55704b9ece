//! Process-wide registry of open stores.
//!
//! redb holds an exclusive lock on a store file, so a second open of the same
//! file fails. Components of one process share a single engine per canonical
//! path through this registry instead.

use std::{
    io,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use dashmap::{DashMap, mapref::entry::Entry};
use sensordb_types::config::StoreConfig;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::{
    engine::StorageEngine,
    error::{IoSnafu, Result},
};

/// Shared engines, keyed by canonical store path.
#[derive(Debug, Default)]
pub struct StoreRegistry {
    stores: DashMap<PathBuf, StorageEngine>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static StoreRegistry {
        static GLOBAL: OnceLock<StoreRegistry> = OnceLock::new();
        GLOBAL.get_or_init(StoreRegistry::new)
    }

    /// Returns the engine for `path`, opening the store on first use.
    ///
    /// `config` only applies when this call opens the store; later calls
    /// share the engine opened first.
    pub fn open(&self, path: impl AsRef<Path>, config: &StoreConfig) -> Result<StorageEngine> {
        let key = canonical(path.as_ref())?;
        match self.stores.entry(key) {
            Entry::Occupied(entry) => {
                debug!(path = %entry.key().display(), "Reusing open store");
                Ok(entry.get().clone())
            },
            Entry::Vacant(entry) => {
                let engine = StorageEngine::open(entry.key(), config)?;
                entry.insert(engine.clone());
                Ok(engine)
            },
        }
    }

    /// Forgets the engine for `path`. The file is closed once every clone of
    /// the engine has been dropped. Returns whether it was registered.
    pub fn close(&self, path: impl AsRef<Path>) -> Result<bool> {
        let key = canonical(path.as_ref())?;
        let removed = self.stores.remove(&key).is_some();
        if removed {
            info!(path = %key.display(), "Closed store");
        }
        Ok(removed)
    }

    /// Paths of all registered stores.
    pub fn open_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.stores.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }
}

/// Canonical form of a store path that may not exist yet: the canonical
/// parent directory joined with the file name.
fn canonical(path: &Path) -> Result<PathBuf> {
    let display = || path.display().to_string();
    if path.exists() {
        return std::fs::canonicalize(path).context(IoSnafu { path: display() });
    }
    let file_name = path.file_name().ok_or_else(|| io::Error::new(
        io::ErrorKind::InvalidInput,
        "store path has no file name",
    )).context(IoSnafu { path: display() })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = std::fs::canonicalize(parent).context(IoSnafu { path: display() })?;
    Ok(parent.join(file_name))
}
