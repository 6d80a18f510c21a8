// SPDX-License-Identifier: MIT OR Apache-2.0

//! Immutable bound configuration snapshots and snapshot diffs.
//!
//! A snapshot is produced once per successful bind and never mutated; a
//! reload that succeeds replaces the whole snapshot atomically. Diffs are
//! computed over the flat (dotted-key) representation of two consecutive
//! snapshots.

use crate::domain::key::ConfigKey;
use crate::domain::value::ConfigValue;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// One immutable, fully bound configuration instance.
///
/// The snapshot holds both the nested value tree (for typed access by path)
/// and its flat dotted-key projection (for diffing).
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use varlord::domain::snapshot::ConfigSnapshot;
/// use varlord::domain::value::ConfigValue;
///
/// let mut db = BTreeMap::new();
/// db.insert("host".to_string(), ConfigValue::from("localhost"));
/// let mut root = BTreeMap::new();
/// root.insert("db".to_string(), ConfigValue::Map(db));
///
/// let snapshot = ConfigSnapshot::from_root(root);
/// assert_eq!(snapshot.get_str("db.host"), Some("localhost".to_string()));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigSnapshot {
    root: BTreeMap<String, ConfigValue>,
    #[serde(skip)]
    flat: BTreeMap<ConfigKey, ConfigValue>,
}

impl ConfigSnapshot {
    /// Builds a snapshot from a nested value tree, deriving the flat
    /// projection.
    pub fn from_root(root: BTreeMap<String, ConfigValue>) -> Self {
        let mut flat = BTreeMap::new();
        flatten_into(&root, "", &mut flat);
        Self { root, flat }
    }

    /// An empty snapshot.
    pub fn empty() -> Self {
        Self::from_root(BTreeMap::new())
    }

    /// The nested value tree.
    pub fn root(&self) -> &BTreeMap<String, ConfigValue> {
        &self.root
    }

    /// The flat dotted-key projection of this snapshot.
    pub fn flat(&self) -> &BTreeMap<ConfigKey, ConfigValue> {
        &self.flat
    }

    /// Looks a value up by dotted path, walking nested maps.
    pub fn get(&self, path: &str) -> Option<&ConfigValue> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.root.get(first)?;
        for segment in segments {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Looks up a string value by dotted path.
    pub fn get_str(&self, path: &str) -> Option<String> {
        self.get(path).and_then(|v| v.coerce_str(path).ok())
    }

    /// Looks up an integer value by dotted path.
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(|v| v.coerce_i64(path).ok())
    }

    /// Looks up an unsigned integer value by dotted path.
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.coerce_u64(path).ok())
    }

    /// Looks up a boolean value by dotted path.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(|v| v.coerce_bool(path).ok())
    }

    /// Looks up a float value by dotted path.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(|v| v.coerce_f64(path).ok())
    }
}

fn flatten_into(
    map: &BTreeMap<String, ConfigValue>,
    prefix: &str,
    out: &mut BTreeMap<ConfigKey, ConfigValue>,
) {
    for (name, value) in map {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };
        match value {
            ConfigValue::Map(sub) => flatten_into(sub, &path, out),
            leaf => {
                out.insert(ConfigKey::new(path), leaf.clone());
            }
        }
    }
}

/// The observable difference between two consecutive snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigDiff {
    /// Keys present in the new snapshot but not the old one.
    pub added: BTreeSet<ConfigKey>,
    /// Keys present in both with different values.
    pub modified: BTreeSet<ConfigKey>,
    /// Keys present in the old snapshot but not the new one.
    pub deleted: BTreeSet<ConfigKey>,
}

impl ConfigDiff {
    /// Computes the diff between the flat representations of two snapshots.
    pub fn between(old: &ConfigSnapshot, new: &ConfigSnapshot) -> Self {
        let mut diff = ConfigDiff::default();
        for (key, new_value) in new.flat() {
            match old.flat().get(key) {
                None => {
                    diff.added.insert(key.clone());
                }
                Some(old_value) if old_value != new_value => {
                    diff.modified.insert(key.clone());
                }
                Some(_) => {}
            }
        }
        for key in old.flat().keys() {
            if !new.flat().contains_key(key) {
                diff.deleted.insert(key.clone());
            }
        }
        diff
    }

    /// True if nothing observable changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed keys.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }
}
