//! Structured metadata values.
//!
//! Metadata properties are persisted as YAML text. In memory they are a
//! tagged [`MetaValue`] rather than an untyped blob, so callers get static
//! guarantees while unknown properties still round-trip unchanged.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::validation::SensorName;

/// Property holding the human-readable label.
pub const PROP_LABEL: &str = "label";
/// Property holding the physical unit.
pub const PROP_UNIT: &str = "unit";
/// Lower plot bound.
pub const PROP_PLOT_MIN: &str = "plot_min_val";
/// Upper plot bound.
pub const PROP_PLOT_MAX: &str = "plot_max_val";
/// Value-formatting hint.
pub const PROP_FORMAT: &str = "format";

/// A structured metadata value.
///
/// YAML `5` decodes as `Integer`, `5.0` as `Number` and `"5"` as `Text`.
/// Mapping keys that are not strings are kept in their YAML spelling
/// (`1: a` yields the key `"1"`), and tags are dropped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// YAML `null` (`~`).
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Integer(i64),
    /// Floating point scalar.
    Number(f64),
    /// String scalar.
    Text(String),
    /// Sequence of values.
    List(Vec<MetaValue>),
    /// Mapping of string keys to values.
    Map(BTreeMap<String, MetaValue>),
}

impl MetaValue {
    /// Parses YAML text into a value.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the text is not well-formed YAML.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(text)
    }

    /// Serializes the value to YAML text.
    ///
    /// # Errors
    ///
    /// Returns the YAML error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yml::Error> {
        serde_yml::to_string(self)
    }

    /// Whether this is YAML `null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the string if this is a `Text` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns a numeric view of `Integer` and `Number` values.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the mapping if this is a `Map` value.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, MetaValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl TryFrom<serde_yml::Value> for MetaValue {
    type Error = serde_yml::Error;

    fn try_from(value: serde_yml::Value) -> Result<Self, Self::Error> {
        use serde_yml::Value;

        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Self::Integer(i),
                (None, Some(f)) => Self::Number(f),
                (None, None) => return Err(de::Error::custom(format!("unsupported number {n}"))),
            },
            Value::String(text) => Self::Text(text),
            Value::Sequence(items) => {
                Self::List(items.into_iter().map(Self::try_from).collect::<Result<_, _>>()?)
            },
            Value::Mapping(mapping) => {
                let mut map = BTreeMap::new();
                for (key, value) in mapping {
                    map.insert(map_key(key)?, Self::try_from(value)?);
                }
                Self::Map(map)
            },
            Value::Tagged(tagged) => Self::try_from(tagged.value)?,
        })
    }
}

fn map_key(key: serde_yml::Value) -> Result<String, serde_yml::Error> {
    match key {
        serde_yml::Value::String(key) => Ok(key),
        other => Ok(serde_yml::to_string(&other)?.trim_end().to_string()),
    }
}

impl<'de> Deserialize<'de> for MetaValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yml::Value::deserialize(deserializer)?;
        Self::try_from(value).map_err(de::Error::custom)
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
            Self::List(_) | Self::Map(_) => match self.to_yaml() {
                Ok(yaml) => f.write_str(yaml.trim_end()),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Display properties of one sensor, derived from its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Label shown on plots; defaults to the sensor name.
    pub label: String,
    /// Physical unit.
    pub unit: Option<String>,
    /// Lower plot bound.
    pub plot_min_val: Option<f64>,
    /// Upper plot bound.
    pub plot_max_val: Option<f64>,
    /// Value-formatting hint.
    pub format: Option<String>,
}

impl DisplayConfig {
    /// Builds the display configuration from a property mapping.
    ///
    /// Properties of the wrong type are ignored and the default is used.
    #[must_use]
    pub fn from_properties(sensor: &SensorName, properties: &BTreeMap<String, MetaValue>) -> Self {
        let text = |key: &str| properties.get(key).and_then(MetaValue::as_str).map(str::to_string);
        let number = |key: &str| properties.get(key).and_then(MetaValue::as_f64);

        Self {
            label: text(PROP_LABEL).unwrap_or_else(|| sensor.to_string()),
            unit: text(PROP_UNIT),
            plot_min_val: number(PROP_PLOT_MIN),
            plot_max_val: number(PROP_PLOT_MAX),
            format: text(PROP_FORMAT),
        }
    }
}
