// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration value type with type-safe coercions.
//!
//! Sources that read text (environment, `.env` files, CLI tokens) produce
//! string values; sources that speak a structured protocol may produce
//! natively typed values. `ConfigValue` carries both, and the binder coerces
//! whatever arrived into the type a field declares. A value already of the
//! declared native type passes through unchanged.

use crate::domain::errors::{CoercionFailure, ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A configuration value as delivered by a source or held in a snapshot.
///
/// # Examples
///
/// ```
/// use varlord::domain::value::ConfigValue;
///
/// let value = ConfigValue::from("42");
/// assert_eq!(value.coerce_i64("test.key").unwrap(), 42);
///
/// let native = ConfigValue::Int(42);
/// assert_eq!(native.coerce_i64("test.key").unwrap(), 42);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// A boolean value.
    Bool(bool),
    /// A signed integer value.
    Int(i64),
    /// An unsigned integer value, used when a value exceeds `i64::MAX`.
    UInt(u64),
    /// A floating point value.
    Float(f64),
    /// A string value, the common case for text-based sources.
    Str(String),
    /// A list of values.
    List(Vec<ConfigValue>),
    /// A nested map of values, keyed by plain (undotted) field names.
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Returns the value as a string slice if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the nested map if this value is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Coerces the value to a string.
    ///
    /// Scalars render with their `Display` form; structured values are a
    /// coercion error rather than being silently stringified.
    pub fn coerce_str(&self, key: &str) -> Result<String> {
        match self {
            ConfigValue::Str(s) => Ok(s.clone()),
            ConfigValue::Bool(b) => Ok(b.to_string()),
            ConfigValue::Int(n) => Ok(n.to_string()),
            ConfigValue::UInt(n) => Ok(n.to_string()),
            ConfigValue::Float(f) => Ok(f.to_string()),
            other => Err(coercion_error(key, "string", other)),
        }
    }

    /// Coerces the value to a boolean.
    ///
    /// String values accept a fixed token set (case-insensitive):
    /// `true`, `yes`, `1`, `on` / `false`, `no`, `0`, `off`.
    ///
    /// # Examples
    ///
    /// ```
    /// use varlord::domain::value::ConfigValue;
    ///
    /// assert!(ConfigValue::from("yes").coerce_bool("k").unwrap());
    /// assert!(!ConfigValue::from("off").coerce_bool("k").unwrap());
    /// ```
    pub fn coerce_bool(&self, key: &str) -> Result<bool> {
        match self {
            ConfigValue::Bool(b) => Ok(*b),
            ConfigValue::Str(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" | "on" => Ok(true),
                "false" | "no" | "0" | "off" => Ok(false),
                _ => Err(coercion_error(key, "boolean", self)),
            },
            other => Err(coercion_error(key, "boolean", other)),
        }
    }

    /// Coerces the value to an `i64`, surfacing format and overflow errors.
    pub fn coerce_i64(&self, key: &str) -> Result<i64> {
        match self {
            ConfigValue::Int(n) => Ok(*n),
            ConfigValue::UInt(n) => {
                i64::try_from(*n).map_err(|_| coercion_error(key, "integer", self))
            }
            ConfigValue::Str(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| coercion_error(key, "integer", self)),
            other => Err(coercion_error(key, "integer", other)),
        }
    }

    /// Coerces the value to a `u64`, surfacing format and overflow errors.
    pub fn coerce_u64(&self, key: &str) -> Result<u64> {
        match self {
            ConfigValue::UInt(n) => Ok(*n),
            ConfigValue::Int(n) => {
                u64::try_from(*n).map_err(|_| coercion_error(key, "unsigned integer", self))
            }
            ConfigValue::Str(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| coercion_error(key, "unsigned integer", self)),
            other => Err(coercion_error(key, "unsigned integer", other)),
        }
    }

    /// Coerces the value to an `f64`.
    pub fn coerce_f64(&self, key: &str) -> Result<f64> {
        match self {
            ConfigValue::Float(f) => Ok(*f),
            ConfigValue::Int(n) => Ok(*n as f64),
            ConfigValue::UInt(n) => Ok(*n as f64),
            ConfigValue::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| coercion_error(key, "float", self)),
            other => Err(coercion_error(key, "float", other)),
        }
    }

    /// Coerces the value to a list.
    ///
    /// A string value is attempted as a generic structured-data (JSON) parse;
    /// a parse failure is reported as a coercion error, never papered over
    /// with a default.
    pub fn coerce_list(&self, key: &str) -> Result<Vec<ConfigValue>> {
        match self {
            ConfigValue::List(items) => Ok(items.clone()),
            ConfigValue::Str(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(serde_json::Value::Array(items)) => {
                    Ok(items.into_iter().map(ConfigValue::from).collect())
                }
                _ => Err(coercion_error(key, "list", self)),
            },
            other => Err(coercion_error(key, "list", other)),
        }
    }

    /// Coerces the value to a nested map, parsing strings as JSON objects.
    pub fn coerce_map(&self, key: &str) -> Result<BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Map(m) => Ok(m.clone()),
            ConfigValue::Str(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(serde_json::Value::Object(fields)) => Ok(fields
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect()),
                _ => Err(coercion_error(key, "map", self)),
            },
            other => Err(coercion_error(key, "map", other)),
        }
    }
}

fn coercion_error(key: &str, expected: &str, value: &ConfigValue) -> ConfigError {
    ConfigError::Coercion(CoercionFailure {
        key: key.to_string(),
        expected: expected.to_string(),
        value: format!("{}", value),
    })
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Str(s)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Str(s.to_string())
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        ConfigValue::Int(n)
    }
}

impl From<u64> for ConfigValue {
    fn from(n: u64) -> Self {
        ConfigValue::UInt(n)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<serde_json::Value> for ConfigValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ConfigValue::Str(String::new()),
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    ConfigValue::UInt(u)
                } else {
                    ConfigValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => ConfigValue::Str(s),
            serde_json::Value::Array(items) => {
                ConfigValue::List(items.into_iter().map(ConfigValue::from).collect())
            }
            serde_json::Value::Object(fields) => ConfigValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Str(s) => write!(f, "{}", s),
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(n) => write!(f, "{}", n),
            ConfigValue::UInt(n) => write!(f, "{}", n),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            ConfigValue::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}
