//! Store configuration: engine cache, scan batching, durability, note limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Minimum cache size: 1 MB.
const MIN_CACHE_SIZE_BYTES: usize = 1024 * 1024;

/// Maximum number of entries fetched per scan batch.
pub const MAX_SCAN_BATCH_SIZE: usize = 65_536;

/// Commit durability of write transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    /// Every commit is fsynced before it returns.
    #[default]
    Immediate,
    /// Commits become durable with a later immediate commit or on clean
    /// shutdown. A crash can lose recent writes but never corrupts the file.
    Eventual,
}

/// Store configuration.
///
/// # Validation Rules
///
/// - `cache_size_bytes` must be >= 1 MB (1,048,576 bytes)
/// - `scan_batch_size` must be 1-65536
/// - `max_note_bytes` must be > 0
///
/// # Example
///
/// ```no_run
/// # use sensordb_types::config::StoreConfig;
/// let config = StoreConfig::builder()
///     .cache_size_bytes(128 * 1024 * 1024)
///     .scan_batch_size(4096)
///     .build()
///     .expect("valid store config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StoreConfig {
    /// Engine page cache size in bytes.
    #[serde(default = "default_cache_size")]
    pub cache_size_bytes: usize,
    /// Number of entries a lazy scan fetches from its snapshot per batch.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,
    /// Commit durability for write transactions.
    #[serde(default)]
    pub durability: Durability,
    /// Maximum size of a single note in bytes.
    #[serde(default = "default_max_note_bytes")]
    pub max_note_bytes: usize,
}

#[bon::bon]
impl StoreConfig {
    /// Creates a new store configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_cache_size())] cache_size_bytes: usize,
        #[builder(default = default_scan_batch_size())] scan_batch_size: usize,
        #[builder(default)] durability: Durability,
        #[builder(default = default_max_note_bytes())] max_note_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { cache_size_bytes, scan_batch_size, durability, max_note_bytes };
        config.validate()?;
        Ok(config)
    }
}

impl StoreConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size_bytes < MIN_CACHE_SIZE_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "cache_size_bytes must be >= {} (1 MB), got {}",
                    MIN_CACHE_SIZE_BYTES, self.cache_size_bytes
                ),
            });
        }
        if self.scan_batch_size == 0 || self.scan_batch_size > MAX_SCAN_BATCH_SIZE {
            return Err(ConfigError::Validation {
                message: format!(
                    "scan_batch_size must be 1-{}, got {}",
                    MAX_SCAN_BATCH_SIZE, self.scan_batch_size
                ),
            });
        }
        if self.max_note_bytes == 0 {
            return Err(ConfigError::Validation {
                message: "max_note_bytes must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: default_cache_size(),
            scan_batch_size: default_scan_batch_size(),
            durability: Durability::default(),
            max_note_bytes: default_max_note_bytes(),
        }
    }
}

fn default_cache_size() -> usize {
    64 * 1024 * 1024 // 64 MB
}

fn default_scan_batch_size() -> usize {
    1024
}

fn default_max_note_bytes() -> usize {
    64 * 1024 // 64 KB
}
