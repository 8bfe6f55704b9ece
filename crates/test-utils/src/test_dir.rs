//! Scratch directories for store files.

// Test utilities are expected to panic on failure
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Scratch directory holding store and config files for one test.
///
/// Removed on drop, so close every store opened inside it first.
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: TempDir::with_prefix("sensordb-").expect("create scratch directory") }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// `<name>.redb` inside the directory. The file is not created.
    #[must_use]
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.inner.path().join(format!("{name}.redb"))
    }

    /// Writes `sensordb.toml` with `contents` and returns its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    #[must_use]
    pub fn config_file(&self, contents: &str) -> PathBuf {
        let path = self.inner.path().join("sensordb.toml");
        std::fs::write(&path, contents).expect("write config file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
