//! Command execution.

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use sensordb_storage::{NoteScope, SensorStore, StoreError, TransferOptions};
use sensordb_types::{Reading, SensorName, config::StoreConfig};
use serde::Serialize;
use snafu::ResultExt;
use tracing::info;

use crate::{
    config::{
        Cli, CliCommand, ConfigAction, MetaAction, NotesAction, load_store_config, store_config_schema,
    },
    error::{CliError, JsonSnafu, OutputSnafu, StoreFileNotFoundSnafu},
};

/// Runs the parsed command, writing results to `out`.
pub fn run(cli: &Cli, out: &mut impl Write) -> Result<(), CliError> {
    let config = load_store_config(cli.config.as_deref())?;

    match &cli.command {
        CliCommand::Config { action: ConfigAction::Schema } => {
            writeln!(out, "{}", store_config_schema()?).context(OutputSnafu)
        },
        CliCommand::Config { action: ConfigAction::Show } => print_json(out, &config),
        CliCommand::Write { sensor, timestamp, value } => {
            let store = open_store(cli, &config, true)?;
            store.write_reading(sensor, *timestamp, *value)?;
            Ok(())
        },
        command => {
            let store = open_store(cli, &config, false)?;
            run_on_store(&store, command, &config, out)
        },
    }
}

/// Opens the store named on the command line. Only writes create a new file.
fn open_store(cli: &Cli, config: &StoreConfig, create: bool) -> Result<SensorStore, CliError> {
    let path = cli.store_file()?;
    if !create && !path.exists() {
        return StoreFileNotFoundSnafu { path }.fail();
    }
    Ok(SensorStore::open(path, config)?)
}

fn run_on_store(
    store: &SensorStore,
    command: &CliCommand,
    config: &StoreConfig,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        CliCommand::Stats => print_json(out, &store.statistics()?),
        CliCommand::Sensors { non_empty } => {
            let sensors =
                if *non_empty { store.catalog().non_empty_sensors()? } else { store.list_sensors()? };
            for sensor in sensors {
                writeln!(out, "{sensor}").context(OutputSnafu)?;
            }
            Ok(())
        },
        CliCommand::Read { sensor, range, limit, json } => {
            let readings: Vec<Reading> =
                store.series(sensor).scan(range.range(), *limit)?.collect::<Result<_, StoreError>>()?;
            if *json {
                return print_json(out, &readings);
            }
            for reading in readings {
                writeln!(out, "{}\t{}", format_timestamp(reading.timestamp), reading.value)
                    .context(OutputSnafu)?;
            }
            Ok(())
        },
        CliCommand::Latest { sensors } => {
            for (sensor, reading) in store.query().latest(sensors)? {
                match reading {
                    Some(reading) => writeln!(
                        out,
                        "{sensor}\t{}\t{}",
                        format_timestamp(reading.timestamp),
                        reading.value
                    ),
                    None => writeln!(out, "{sensor}\t-\t-"),
                }
                .context(OutputSnafu)?;
            }
            Ok(())
        },
        CliCommand::Meta { action } => run_meta(store, action, out),
        CliCommand::Notes { action } => run_notes(store, action, out),
        CliCommand::Copy { sensor, range, dest_file, dest_sensor, move_data, no_metadata, no_notes } => {
            let dest = match dest_file {
                Some(path) => SensorStore::open(path, config)?,
                None => store.clone(),
            };
            let options = TransferOptions::builder()
                .range(range.range())
                .include_metadata(!no_metadata)
                .include_notes(!no_notes)
                .maybe_dest_sensor(dest_sensor.clone())
                .build();
            let report = store.transfer(&dest, sensor, &options, *move_data)?;
            print_json(out, &report)
        },
        CliCommand::DeleteSensor { sensor } => {
            let existed = store.delete_sensor(sensor)?;
            info!(sensor = %sensor, existed, "delete-sensor finished");
            writeln!(out, "{}", if existed { "deleted" } else { "not found" }).context(OutputSnafu)
        },
        CliCommand::Write { .. } | CliCommand::Config { .. } => Ok(()),
    }
}

fn run_meta(store: &SensorStore, action: &MetaAction, out: &mut impl Write) -> Result<(), CliError> {
    match action {
        MetaAction::Get { sensor, property: Some(property) } => {
            let value = store.metadata(sensor).get(property)?;
            print_json(out, &value)
        },
        MetaAction::Get { sensor, property: None } => print_json(out, &store.get_metadata(sensor)?),
        MetaAction::Set { sensor, property, value } => {
            store.metadata(sensor).set_yaml(property, value)?;
            Ok(())
        },
    }
}

fn run_notes(store: &SensorStore, action: &NotesAction, out: &mut impl Write) -> Result<(), CliError> {
    match action {
        NotesAction::Add { text, sensor, at } => {
            let timestamp = at.unwrap_or_else(Utc::now);
            store.add_note(&scope(sensor.as_ref()), timestamp, text)?;
            writeln!(out, "{}", format_timestamp(timestamp)).context(OutputSnafu)
        },
        NotesAction::List { sensor, range } => {
            for note in store.read_notes(&scope(sensor.as_ref()), range.range())? {
                let note = note?;
                writeln!(out, "{}\t{}", format_timestamp(note.timestamp), note.text).context(OutputSnafu)?;
            }
            Ok(())
        },
    }
}

fn scope(sensor: Option<&SensorName>) -> NoteScope {
    sensor.map_or(NoteScope::Global, |sensor| NoteScope::Sensor(sensor.clone()))
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> Result<(), CliError> {
    serde_json::to_writer_pretty(&mut *out, value).context(JsonSnafu)?;
    writeln!(out).context(OutputSnafu)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use clap::Parser;
    use sensordb_storage::StoreRegistry;
    use sensordb_test_utils::TestDir;

    use super::*;

    /// Runs `sensordb --file <store> <args>` and returns stdout.
    fn sensordb(store: &std::path::Path, args: &[&str]) -> Result<String, CliError> {
        let mut argv = vec!["sensordb", "--file", store.to_str().unwrap()];
        argv.extend_from_slice(args);
        let cli = Cli::try_parse_from(argv).unwrap();
        let mut out = Vec::new();
        run(&cli, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_write_read_latest() {
        let dir = TestDir::new();
        let store = dir.store_path("cli");
        sensordb(&store, &["write", "tank", "2024-01-01T00:00:00Z", "1.5"]).unwrap();
        sensordb(&store, &["write", "tank", "2024-01-01T01:00:00Z", "-2"]).unwrap();

        let read = sensordb(&store, &["read", "tank", "--until", "2024-01-01T01:00:00Z"]).unwrap();
        assert_eq!(read, "2024-01-01T00:00:00.000000Z\t1.5\n");

        let latest = sensordb(&store, &["latest", "tank"]).unwrap();
        assert_eq!(latest, "tank\t2024-01-01T01:00:00.000000Z\t-2\n");

        let sensors = sensordb(&store, &["sensors"]).unwrap();
        assert_eq!(sensors, "tank\n");
        StoreRegistry::global().close(&store).unwrap();
    }

    #[test]
    fn test_read_requires_existing_store() {
        let dir = TestDir::new();
        let err = sensordb(&dir.store_path("absent"), &["stats"]).unwrap_err();
        assert!(matches!(err, CliError::StoreFileNotFound { .. }));
    }

    #[test]
    fn test_metadata_and_notes() {
        let dir = TestDir::new();
        let store = dir.store_path("meta");
        sensordb(&store, &["write", "tank", "1704067200", "1"]).unwrap();
        sensordb(&store, &["meta", "set", "tank", "unit", "bar"]).unwrap();
        assert_eq!(sensordb(&store, &["meta", "get", "tank", "unit"]).unwrap(), "\"bar\"\n");

        let err = sensordb(&store, &["meta", "get", "tank", "scale"]).unwrap_err();
        assert!(matches!(err, CliError::Store { source: StoreError::NotFound { .. } }));

        sensordb(&store, &["notes", "add", "refilled", "--sensor", "tank", "--at", "1704067200"]).unwrap();
        let notes = sensordb(&store, &["notes", "list", "--sensor", "tank"]).unwrap();
        assert_eq!(notes, "2024-01-01T00:00:00.000000Z\trefilled\n");
        StoreRegistry::global().close(&store).unwrap();
    }

    #[test]
    fn test_copy_and_move_between_files() {
        let dir = TestDir::new();
        let (src, dst) = (dir.store_path("src"), dir.store_path("dst"));
        for (ts, value) in [("1704067200", "1"), ("1704070800", "2"), ("1704074400", "3")] {
            sensordb(&src, &["write", "tank", ts, value]).unwrap();
        }

        let report = sensordb(&src, &[
            "copy",
            "tank",
            "--dest-file",
            dst.to_str().unwrap(),
            "--since",
            "1704070800",
            "--move",
        ])
        .unwrap();
        let report: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(report["readings"], 2);
        assert_eq!(report["moved"], true);

        assert_eq!(sensordb(&src, &["read", "tank"]).unwrap().lines().count(), 1);
        assert_eq!(sensordb(&dst, &["read", "tank"]).unwrap().lines().count(), 2);
        StoreRegistry::global().close(&src).unwrap();
        StoreRegistry::global().close(&dst).unwrap();
    }

    #[test]
    fn test_delete_sensor() {
        let dir = TestDir::new();
        let store = dir.store_path("delete");
        sensordb(&store, &["write", "tank", "1704067200", "1"]).unwrap();
        assert_eq!(sensordb(&store, &["delete-sensor", "tank"]).unwrap(), "deleted\n");
        assert_eq!(sensordb(&store, &["delete-sensor", "tank"]).unwrap(), "not found\n");
        assert_eq!(sensordb(&store, &["sensors"]).unwrap(), "");
        StoreRegistry::global().close(&store).unwrap();
    }
}
