//! Name validation for sensors, metadata properties and plot groups.
//!
//! Sensor names become part of engine collection names (`data_{sensor}`), so
//! they are restricted to a whitelist that is safe for collection names, file
//! paths and log output.
//!
//! ## Character Whitelists
//!
//! - Sensor names: `[A-Za-z0-9_.:/-]`, 1-200 bytes. `/` is allowed so MQTT
//!   topics can be used verbatim.
//! - Property and group names: any non-control UTF-8, 1-255 bytes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Maximum sensor name length in bytes.
pub const MAX_SENSOR_NAME_BYTES: usize = 200;

/// Maximum property or plot group name length in bytes.
pub const MAX_KEY_NAME_BYTES: usize = 255;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// A validated sensor name.
///
/// Construction is the only validation point; every collection name derived
/// from a `SensorName` is therefore well-formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SensorName(String);

impl SensorName {
    /// Validates and wraps a sensor name.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the name is empty, longer than
    /// [`MAX_SENSOR_NAME_BYTES`], or contains characters outside
    /// `[A-Za-z0-9_.:/-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_sensor_name(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SensorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SensorName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SensorName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SensorName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SensorName {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SensorName> for String {
    fn from(name: SensorName) -> Self {
        name.0
    }
}

/// Validates a sensor name against the collection-safe whitelist.
///
/// # Errors
///
/// Returns [`ValidationError`] if the name is empty, too long, or contains
/// characters outside `[A-Za-z0-9_.:/-]`.
pub fn validate_sensor_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError {
            field: "sensor_name".to_string(),
            constraint: "must not be empty".to_string(),
        });
    }
    if name.len() > MAX_SENSOR_NAME_BYTES {
        return Err(ValidationError {
            field: "sensor_name".to_string(),
            constraint: format!(
                "length {} bytes exceeds maximum {} bytes",
                name.len(),
                MAX_SENSOR_NAME_BYTES
            ),
        });
    }
    if let Some(pos) = name.find(|c: char| !is_sensor_char(c)) {
        return Err(ValidationError {
            field: "sensor_name".to_string(),
            constraint: format!(
                "contains invalid character {:?} at byte offset {}; allowed: [A-Za-z0-9_.:/-]",
                name[pos..].chars().next().unwrap_or('\0'),
                pos
            ),
        });
    }
    Ok(())
}

/// Validates a metadata property or plot group name.
///
/// # Errors
///
/// Returns [`ValidationError`] if the name is empty, longer than
/// [`MAX_KEY_NAME_BYTES`], or contains control characters.
pub fn validate_key_name(name: &str, field: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: "must not be empty".to_string(),
        });
    }
    if name.len() > MAX_KEY_NAME_BYTES {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: format!(
                "length {} bytes exceeds maximum {} bytes",
                name.len(),
                MAX_KEY_NAME_BYTES
            ),
        });
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: "must not contain control characters".to_string(),
        });
    }
    Ok(())
}

fn is_sensor_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}
