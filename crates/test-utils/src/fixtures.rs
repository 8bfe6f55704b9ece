//! Canned sensor data shared by integration tests.

use chrono::{DateTime, TimeZone, Utc};
use sensordb_types::{Reading, SensorName};

/// The `tank` sensor used across storage tests.
///
/// # Panics
///
/// Never; the name is a valid literal.
#[must_use]
#[allow(clippy::expect_used)]
pub fn tank() -> SensorName {
    SensorName::new("tank").expect("literal sensor name")
}

/// `2024-01-01T<hour>:<minute>:00Z`.
#[must_use]
pub fn jan_first(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, hour, minute, 0)
        .single()
        .unwrap_or_else(|| DateTime::<Utc>::from(std::time::UNIX_EPOCH))
}

/// Three hourly tank readings: `00:00 -> 1.0`, `01:00 -> 2.0`, `02:00 -> 3.0`.
#[must_use]
pub fn tank_readings() -> Vec<Reading> {
    vec![
        Reading::new(jan_first(0, 0), 1.0),
        Reading::new(jan_first(1, 0), 2.0),
        Reading::new(jan_first(2, 0), 3.0),
    ]
}

/// `count` readings one minute apart starting at midnight, valued by index.
#[must_use]
pub fn minute_readings(count: u32) -> Vec<Reading> {
    (0..count)
        .map(|i| Reading::new(jan_first(0, 0) + chrono::TimeDelta::minutes(i64::from(i)), f64::from(i)))
        .collect()
}
