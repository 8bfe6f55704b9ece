//! sensordb admin binary.
//!
//! Inspects and maintains sensor stores: statistics, reads, metadata, notes,
//! copy/move between stores and sensor removal.
//!
//! # Usage
//!
//! ```bash
//! # Summarize a store
//! sensordb --file plant.redb stats
//!
//! # Read one hour of readings
//! SENSORDB_FILE=plant.redb sensordb read tank \
//!     --since 2024-01-01T00:00:00Z --until 2024-01-01T01:00:00Z
//!
//! # Move last year's readings to an archive store
//! sensordb -f plant.redb copy tank --until 2024-01-01T00:00:00Z \
//!     --dest-file archive.redb --move
//!
//! # Store settings from environment variables
//! SENSORDB__SCAN_BATCH_SIZE=4096 sensordb -f plant.redb read tank
//! ```

mod commands;
mod config;
mod error;

use std::{
    io::{IsTerminal, Write},
    process::ExitCode,
};

use clap::Parser;
use config::{Cli, LogFormat};
use error::OutputSnafu;
use snafu::ResultExt;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = commands::run(&cli, &mut out).and_then(|()| out.flush().context(OutputSnafu));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_fatal() => {
            tracing::error!(error = %err, "Store is corrupted, aborting");
            std::process::abort();
        },
        Err(err) => {
            tracing::debug!(error = ?err, "Command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        },
    }
}

/// Initializes logging on stderr; stdout carries command output.
///
/// Supports three formats:
/// - `Text`: Human-readable format
/// - `Json`: JSON structured logging
/// - `Auto`: JSON for non-TTY stderr, text otherwise
fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let use_json = match format {
        LogFormat::Json => true,
        LogFormat::Text => false,
        LogFormat::Auto => !std::io::stderr().is_terminal(),
    };

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}
