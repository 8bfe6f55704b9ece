//! Proptest strategies for sensordb domain types.
//!
//! # Usage
//!
//! ```no_run
//! use sensordb_test_utils::strategies;
//! use proptest::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn my_property(readings in strategies::arb_readings(64)) {
//!         // test invariant with randomly generated readings
//!     }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use sensordb_types::{Reading, SensorName, TimeRange};

/// First second of 2020.
const RANGE_START_SECS: i64 = 1_577_836_800;
/// First second of 2030.
const RANGE_END_SECS: i64 = 1_893_456_000;

/// Generates a valid sensor name of 1-33 characters.
pub fn arb_sensor_name() -> impl Strategy<Value = SensorName> {
    "[a-z][a-z0-9_./:-]{0,32}".prop_filter_map("valid sensor name", |name| SensorName::new(name).ok())
}

/// Generates a [`DateTime<Utc>`] between 2020-01-01 and 2030-01-01 with
/// microsecond precision.
pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (RANGE_START_SECS..RANGE_END_SECS, 0u32..1_000_000).prop_map(|(secs, micros)| {
        Utc.timestamp_opt(secs, micros * 1_000)
            .single()
            .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
    })
}

/// Generates any `f64`, including `NaN` payloads, infinities and signed zero.
pub fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        8 => any::<f64>(),
        1 => any::<u64>().prop_map(f64::from_bits),
        1 => prop::sample::select(vec![f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -0.0, 0.0]),
    ]
}

/// Generates up to `max` readings with distinct timestamps, in ascending
/// timestamp order.
pub fn arb_readings(max: usize) -> impl Strategy<Value = Vec<Reading>> {
    proptest::collection::btree_map(arb_timestamp(), arb_value(), 0..=max).prop_map(
        |readings: BTreeMap<DateTime<Utc>, f64>| {
            readings.into_iter().map(|(timestamp, value)| Reading::new(timestamp, value)).collect()
        },
    )
}

/// Generates a range whose bounds are each either open or a timestamp, with
/// `since <= until` when both are set.
pub fn arb_range() -> impl Strategy<Value = TimeRange> {
    (proptest::option::of(arb_timestamp()), proptest::option::of(arb_timestamp())).prop_map(
        |bounds| match bounds {
            (Some(a), Some(b)) if a > b => TimeRange::between(b, a),
            (Some(a), Some(b)) => TimeRange::between(a, b),
            (since, until) => TimeRange { since, until },
        },
    )
}
