// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration key newtype and the canonical key normalizer.
//!
//! Every source speaks its own key convention (`APP_DB__HOST`, `db/host`,
//! `--db-host`). Before merging, all keys are brought into the canonical
//! form: dotted, lower-case, with `__` marking descent into a nested field
//! and a single `_` remaining part of a flat field name.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A type-safe wrapper for canonical configuration keys.
///
/// `ConfigKey` wraps a `String` to prevent accidental mixing of configuration
/// keys with other string values. Canonical keys are dotted and lower-case
/// (e.g. `db.host`); use [`normalize_key`] to produce one from a raw source
/// key.
///
/// # Examples
///
/// ```
/// use varlord::domain::key::ConfigKey;
///
/// let key = ConfigKey::from("db.host");
/// assert_eq!(key.as_str(), "db.host");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(String);

impl ConfigKey {
    /// Creates a new `ConfigKey` from a `String` without normalizing it.
    pub fn new(key: String) -> Self {
        ConfigKey(key)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Converts the `ConfigKey` into its inner `String`.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Returns true if this key sits below `prefix` in the dotted hierarchy.
    ///
    /// ```
    /// use varlord::domain::key::ConfigKey;
    ///
    /// assert!(ConfigKey::from("db.host").is_child_of("db"));
    /// assert!(!ConfigKey::from("database").is_child_of("db"));
    /// ```
    pub fn is_child_of(&self, prefix: &str) -> bool {
        self.0.len() > prefix.len() + 1
            && self.0.starts_with(prefix)
            && self.0.as_bytes()[prefix.len()] == b'.'
    }
}

/// Normalizes a raw key from any source convention into canonical form.
///
/// Rules, applied uniformly regardless of source:
///
/// - the whole key is lower-cased;
/// - every `__` becomes a `.` (nesting marker), scanning left to right, so
///   `"___"` normalizes to `"_."` and `"____"` to `".."`;
/// - a single `_` is preserved verbatim: it is part of a flat field's name.
///
/// Normalization never fails and is idempotent, which lets the store apply it
/// defensively to keys a source may have already normalized. Two raw keys
/// denoting the same logical key under different conventions normalize equal,
/// which is what makes override semantics work across sources.
///
/// # Examples
///
/// ```
/// use varlord::domain::key::normalize_key;
///
/// assert_eq!(normalize_key("APP_DB__HOST").as_str(), "app_db.host");
/// assert_eq!(normalize_key("db__host").as_str(), "db.host");
/// assert_eq!(normalize_key("K8S_POD_NAME").as_str(), "k8s_pod_name");
/// ```
pub fn normalize_key(raw: &str) -> ConfigKey {
    ConfigKey(raw.to_lowercase().replace("__", "."))
}

impl From<String> for ConfigKey {
    fn from(s: String) -> Self {
        ConfigKey(s)
    }
}

impl From<&str> for ConfigKey {
    fn from(s: &str) -> Self {
        ConfigKey(s.to_string())
    }
}

impl From<ConfigKey> for String {
    fn from(key: ConfigKey) -> Self {
        key.0
    }
}

impl AsRef<str> for ConfigKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
