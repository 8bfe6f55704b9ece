//! redb storage engine wrapper.
//!
//! Provides a thin wrapper around a redb [`Database`] with:
//! - Store lifecycle (file-backed and in-memory)
//! - Configured cache size and commit durability
//! - Lock and corruption classification of open errors

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use redb::{Database, DatabaseError, ReadTransaction, StorageError, WriteTransaction, backends::InMemoryBackend};
use sensordb_types::config::{Durability, StoreConfig};
use snafu::ResultExt;
use tracing::{error, info};

use crate::error::{IoSnafu, OpenSnafu, Result, StoreError, TransactionSnafu};

/// Shared handle to one store file.
///
/// Cloning is cheap; every clone refers to the same underlying database.
/// redb allows one open handle per file, so a process shares a single engine
/// per path (see [`crate::StoreRegistry`]).
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<Database>,
    path: Option<PathBuf>,
    config: StoreConfig,
}

impl StorageEngine {
    /// Open or create the store file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] when another handle holds the file
    /// lock, and [`StoreError::Open`] for any other failure.
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::builder()
            .set_cache_size(config.cache_size_bytes)
            .create(path)
            .or_else(|e| classify_open_error(path, e))?;

        info!(path = %path.display(), cache_size = config.cache_size_bytes, "Opened store");
        Ok(Self { db: Arc::new(db), path: Some(path.to_path_buf()), config: config.clone() })
    }

    /// Create a store that lives in memory only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if the engine cannot initialize.
    pub fn in_memory(config: &StoreConfig) -> Result<Self> {
        let db = Database::builder()
            .set_cache_size(config.cache_size_bytes)
            .create_with_backend(InMemoryBackend::new())
            .context(OpenSnafu { path: ":memory:" })?;

        Ok(Self { db: Arc::new(db), path: None, config: config.clone() })
    }

    /// Begin a snapshot read transaction.
    pub fn begin_read(&self) -> Result<ReadTransaction> {
        self.db.begin_read().context(TransactionSnafu)
    }

    /// Begin a write transaction with the configured durability.
    ///
    /// Blocks while another write transaction is open.
    pub fn begin_write(&self) -> Result<WriteTransaction> {
        let mut txn = self.db.begin_write().context(TransactionSnafu)?;
        txn.set_durability(match self.config.durability {
            Durability::Immediate => redb::Durability::Immediate,
            Durability::Eventual => redb::Durability::Eventual,
        });
        Ok(txn)
    }

    /// Begin write transactions on this store and on `other`, returned in
    /// that order.
    ///
    /// Locks are taken in address order of the two databases, whatever the
    /// argument order, so two transfers in opposite directions never wait on
    /// each other. `other` must be a different store.
    pub(crate) fn begin_write_pair(&self, other: &StorageEngine) -> Result<(WriteTransaction, WriteTransaction)> {
        if Arc::as_ptr(&self.db) < Arc::as_ptr(&other.db) {
            let ours = self.begin_write()?;
            Ok((ours, other.begin_write()?))
        } else {
            let theirs = other.begin_write()?;
            Ok((self.begin_write()?, theirs))
        }
    }

    /// Store file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current size of the store file in bytes (0 for in-memory stores).
    pub fn file_size(&self) -> Result<u64> {
        match &self.path {
            Some(path) => std::fs::metadata(path)
                .map(|m| m.len())
                .context(IoSnafu { path: path.display().to_string() }),
            None => Ok(0),
        }
    }

    /// Whether both handles refer to the same database.
    pub fn same_store(&self, other: &StorageEngine) -> bool {
        Arc::ptr_eq(&self.db, &other.db)
    }

    /// Reclaim free pages.
    ///
    /// Deleted entries never shrink the file in place. Reclaiming space is
    /// done offline by an external copy-compact tool, so this only logs.
    pub fn compact(&self) {
        info!(
            path = ?self.path,
            "Compaction is performed offline by copying the store; nothing to do in-process"
        );
    }
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine").field("path", &self.path).finish_non_exhaustive()
    }
}

fn classify_open_error(path: &Path, e: DatabaseError) -> Result<Database> {
    let path_str = path.display().to_string();
    if let DatabaseError::Storage(StorageError::Corrupted(message)) = &e {
        error!(path = %path_str, message = %message, "Store file is corrupted");
    }
    match e {
        DatabaseError::DatabaseAlreadyOpen => Err(StoreError::StoreLocked { path: path_str }),
        DatabaseError::Storage(StorageError::Io(io_err))
            if io_err.kind() == io::ErrorKind::WouldBlock =>
        {
            Err(StoreError::StoreLocked { path: path_str })
        },
        other => Err(StoreError::Open { path: path_str, source: other }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use redb::TableDefinition;

    use super::*;

    const PROBE: TableDefinition<'static, &'static str, &'static [u8]> = TableDefinition::new("probe");

    #[test]
    fn test_open_in_memory() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).expect("should open");
        assert!(engine.path().is_none());
        assert_eq!(engine.file_size().unwrap(), 0);
        let _read = engine.begin_read().expect("should begin read");
        let _write = engine.begin_write().expect("should begin write");
    }

    #[test]
    fn test_write_and_read() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).expect("should open");

        {
            let txn = engine.begin_write().expect("begin write");
            {
                let mut table = txn.open_table(PROBE).expect("open table");
                table.insert("key", &b"value"[..]).expect("insert");
            }
            txn.commit().expect("commit");
        }

        let txn = engine.begin_read().expect("begin read");
        let table = txn.open_table(PROBE).expect("open table");
        let value = table.get("key").expect("get").expect("present");
        assert_eq!(value.value(), b"value");
    }

    #[test]
    fn test_second_open_reports_locked() {
        let dir = sensordb_test_utils::TestDir::new();
        let path = dir.store_path("locked");
        let _first = StorageEngine::open(&path, &StoreConfig::default()).expect("first open");

        let err = StorageEngine::open(&path, &StoreConfig::default()).unwrap_err();
        assert!(matches!(err, StoreError::StoreLocked { .. }), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_clones_share_the_database() {
        let engine = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        let other = StorageEngine::in_memory(&StoreConfig::default()).unwrap();
        assert!(engine.same_store(&engine.clone()));
        assert!(!engine.same_store(&other));
    }

    #[test]
    fn test_file_size_reported() {
        let dir = sensordb_test_utils::TestDir::new();
        let engine = StorageEngine::open(dir.store_path("s"), &StoreConfig::default()).unwrap();
        assert!(engine.file_size().unwrap() > 0);
    }
}
