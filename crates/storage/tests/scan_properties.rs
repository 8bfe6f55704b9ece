//! Property tests for time-series storage.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use proptest::prelude::*;
use sensordb_storage::SensorStore;
use sensordb_test_utils::{fixtures::tank, strategies};
use sensordb_types::{Reading, TimeRange, config::StoreConfig};

fn store_with(readings: &[Reading], scan_batch_size: usize) -> SensorStore {
    let config = StoreConfig::builder().scan_batch_size(scan_batch_size).build().unwrap();
    let store = SensorStore::in_memory(&config).unwrap();
    store.series(&tank()).put_many(readings).unwrap();
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn scan_returns_exactly_the_readings_in_range(
        readings in strategies::arb_readings(48),
        range in strategies::arb_range(),
        batch in 1usize..8,
    ) {
        let store = store_with(&readings, batch);
        let scanned: Vec<Reading> = store
            .read_range(&tank(), range)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let expected: Vec<Reading> =
            readings.iter().copied().filter(|r| range.contains(&r.timestamp)).collect();

        prop_assert_eq!(scanned.len(), expected.len());
        for (got, want) in scanned.iter().zip(&expected) {
            prop_assert!(got.bit_eq(want), "{got:?} != {want:?}");
        }
    }

    #[test]
    fn values_round_trip_bit_exact(
        timestamp in strategies::arb_timestamp(),
        value in strategies::arb_value(),
    ) {
        let store = SensorStore::in_memory(&StoreConfig::default()).unwrap();
        store.write_reading(&tank(), timestamp, value).unwrap();
        let stored = store.series(&tank()).get(timestamp).unwrap();
        prop_assert_eq!(stored.to_bits(), value.to_bits());
    }

    #[test]
    fn repeated_puts_leave_state_unchanged(readings in strategies::arb_readings(32)) {
        let once = store_with(&readings, 16);
        let twice = store_with(&readings, 16);
        for reading in &readings {
            twice.write_reading(&tank(), reading.timestamp, reading.value).unwrap();
        }

        let scan = |store: &SensorStore| -> Vec<Reading> {
            store.read_range(&tank(), TimeRange::all()).unwrap().collect::<Result<_, _>>().unwrap()
        };
        let (once_scan, twice_scan) = (scan(&once), scan(&twice));
        prop_assert_eq!(twice.series(&tank()).len().unwrap(), once.series(&tank()).len().unwrap());
        prop_assert_eq!(twice_scan.len(), once_scan.len());
        for (got, want) in twice_scan.iter().zip(&once_scan) {
            prop_assert!(got.bit_eq(want), "{got:?} != {want:?}");
        }
    }

    #[test]
    fn delete_range_removes_only_the_range(
        readings in strategies::arb_readings(32),
        range in strategies::arb_range(),
    ) {
        let store = store_with(&readings, 16);
        let removed = store.series(&tank()).delete_range(range).unwrap();
        let inside = readings.iter().filter(|r| range.contains(&r.timestamp)).count();
        prop_assert_eq!(removed, inside);
        prop_assert_eq!(store.series(&tank()).len().unwrap() as usize, readings.len() - inside);
    }
}
