//! Errors surfaced by the command line.

use std::path::PathBuf;

use sensordb_storage::StoreError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(context(false), display("{source}"))]
    Store { source: StoreError },

    #[snafu(display("failed to load configuration: {source}"))]
    LoadConfig { source: ::config::ConfigError },

    #[snafu(display("invalid configuration: {source}"))]
    InvalidConfig { source: sensordb_types::config::ConfigError },

    #[snafu(display("no store file given; pass --file or set SENSORDB_FILE"))]
    MissingStoreFile,

    #[snafu(display("store file {} does not exist", path.display()))]
    StoreFileNotFound { path: PathBuf },

    #[snafu(display("failed to write output: {source}"))]
    Output { source: std::io::Error },

    #[snafu(display("failed to encode output: {source}"))]
    Json { source: serde_json::Error },
}

impl CliError {
    /// Whether the process must stop without further work on the store.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store { source } if source.is_fatal())
    }
}
