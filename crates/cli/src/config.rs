//! Command line and configuration loading.
//!
//! Store settings come from an optional TOML file, overridden by
//! `SENSORDB__*` environment variables (e.g. `SENSORDB__SCAN_BATCH_SIZE=256`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sensordb_types::{SensorName, TimeRange, config::StoreConfig, parse_timestamp};
use snafu::ResultExt;

use crate::error::{CliError, InvalidConfigSnafu, LoadConfigSnafu, MissingStoreFileSnafu};

/// Inspect and maintain sensordb stores.
#[derive(Debug, Parser)]
#[command(name = "sensordb", version, about)]
pub struct Cli {
    /// Store file.
    #[arg(short, long, env = "SENSORDB_FILE", global = true)]
    pub file: Option<PathBuf>,

    /// TOML file with store settings.
    #[arg(long, env = "SENSORDB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "SENSORDB_LOG_FORMAT", value_enum, default_value_t = LogFormat::Auto, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl Cli {
    /// Store file, required by every command touching a store.
    pub fn store_file(&self) -> Result<&Path, CliError> {
        self.file.as_deref().ok_or_else(|| MissingStoreFileSnafu.build())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable.
    Text,
    /// One JSON object per event.
    Json,
    /// JSON when stderr is not a terminal.
    Auto,
}

/// Optional `[since, until)` bounds shared by range commands.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct RangeArgs {
    /// Inclusive lower bound (RFC 3339 or epoch with s/ms/us/ns suffix).
    #[arg(long, value_parser = parse_timestamp)]
    pub since: Option<DateTime<Utc>>,

    /// Exclusive upper bound.
    #[arg(long, value_parser = parse_timestamp)]
    pub until: Option<DateTime<Utc>>,
}

impl RangeArgs {
    pub fn range(&self) -> TimeRange {
        TimeRange { since: self.since, until: self.until }
    }
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Print store statistics as JSON.
    Stats,

    /// List sensors.
    Sensors {
        /// Only sensors with at least one reading.
        #[arg(long)]
        non_empty: bool,
    },

    /// Write one reading.
    Write {
        sensor: SensorName,
        #[arg(value_parser = parse_timestamp)]
        timestamp: DateTime<Utc>,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },

    /// Print readings in a range, one `timestamp<TAB>value` line each.
    Read {
        sensor: SensorName,
        #[command(flatten)]
        range: RangeArgs,
        /// Stop after this many readings.
        #[arg(long)]
        limit: Option<usize>,
        /// Print a JSON array instead of text lines.
        #[arg(long)]
        json: bool,
    },

    /// Print the latest reading of each sensor.
    Latest {
        #[arg(required = true)]
        sensors: Vec<SensorName>,
    },

    /// Sensor metadata.
    Meta {
        #[command(subcommand)]
        action: MetaAction,
    },

    /// Global and per-sensor notes.
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },

    /// Copy or move a sensor to another store or sensor name.
    Copy {
        sensor: SensorName,
        #[command(flatten)]
        range: RangeArgs,
        /// Destination store; defaults to the source store.
        #[arg(long)]
        dest_file: Option<PathBuf>,
        /// Destination sensor; defaults to the source sensor.
        #[arg(long)]
        dest_sensor: Option<SensorName>,
        /// Remove the copied readings and notes from the source.
        #[arg(long = "move")]
        move_data: bool,
        /// Skip metadata.
        #[arg(long)]
        no_metadata: bool,
        /// Skip notes.
        #[arg(long)]
        no_notes: bool,
    },

    /// Drop every collection of a sensor.
    DeleteSensor { sensor: SensorName },

    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum MetaAction {
    /// Print all properties, or one property.
    Get { sensor: SensorName, property: Option<String> },
    /// Set a property from YAML text (`bar`, `1.5`, `[1, 2]`, ...).
    Set { sensor: SensorName, property: String, value: String },
}

#[derive(Debug, Subcommand)]
pub enum NotesAction {
    /// Add a note; global unless `--sensor` is given.
    Add {
        text: String,
        #[arg(long)]
        sensor: Option<SensorName>,
        /// Note timestamp; defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
    },
    /// List notes in a range.
    List {
        #[arg(long)]
        sensor: Option<SensorName>,
        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the JSON schema of the store settings.
    Schema,
    /// Print the effective store settings.
    Show,
}

/// Loads store settings from `path` (if any) and `SENSORDB__*` variables.
pub fn load_store_config(path: Option<&Path>) -> Result<StoreConfig, CliError> {
    let mut builder = ::config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(::config::File::from(path));
    }
    // "__" separates nesting levels; single underscores stay in field names
    // (SENSORDB__CACHE_SIZE_BYTES -> cache_size_bytes).
    builder = builder.add_source(::config::Environment::with_prefix("SENSORDB").separator("__").try_parsing(true));

    let store_config: StoreConfig =
        builder.build().context(LoadConfigSnafu)?.try_deserialize().context(LoadConfigSnafu)?;
    store_config.validate().context(InvalidConfigSnafu)?;
    Ok(store_config)
}

/// JSON schema of [`StoreConfig`].
pub fn store_config_schema() -> Result<String, CliError> {
    let schema = schemars::schema_for!(StoreConfig);
    serde_json::to_string_pretty(&schema).context(crate::error::JsonSnafu)
}
