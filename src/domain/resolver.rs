// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-key priority merge of source snapshots.
//!
//! Each key is resolved independently: the ordering that governs the key is
//! looked up in the [`PriorityPolicy`], and the value from the source latest
//! in that ordering wins. Sources absent from a key's ordering contribute
//! nothing to that key. After the merge, a key that ended up both a leaf
//! value and a parent of further dotted keys is a conflict, handled per the
//! policy's [`ConflictPolicy`].

use crate::domain::errors::{ConfigError, Result};
use crate::domain::key::ConfigKey;
use crate::domain::policy::{ConflictPolicy, PriorityPolicy};
use crate::domain::value::ConfigValue;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

/// The raw key/value pairs one source produced in one load cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceSnapshot {
    /// Stable identifier of the producing source, referenced by orderings.
    pub id: String,
    /// Normalized keys mapped to the values the source provided.
    pub values: BTreeMap<ConfigKey, ConfigValue>,
}

impl SourceSnapshot {
    /// Creates a snapshot for the source with the given id.
    pub fn new(id: impl Into<String>, values: BTreeMap<ConfigKey, ConfigValue>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }
}

/// Merges source snapshots into one flat key/value map under `policy`.
///
/// Resolution is per key: the governing ordering is consulted for every key
/// individually, so a per-pattern override can route part of the key space
/// to a different precedence without affecting the rest.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use varlord::domain::key::ConfigKey;
/// use varlord::domain::policy::PriorityPolicy;
/// use varlord::domain::resolver::{merge, SourceSnapshot};
/// use varlord::domain::value::ConfigValue;
///
/// let defaults = SourceSnapshot::new(
///     "defaults",
///     BTreeMap::from([(ConfigKey::from("db.host"), ConfigValue::from("localhost"))]),
/// );
/// let env = SourceSnapshot::new(
///     "env",
///     BTreeMap::from([(ConfigKey::from("db.host"), ConfigValue::from("db.prod"))]),
/// );
///
/// let policy = PriorityPolicy::new(["defaults", "env"]);
/// let merged = merge(&[defaults, env], &policy).unwrap();
/// assert_eq!(merged[&ConfigKey::from("db.host")], ConfigValue::from("db.prod"));
/// ```
pub fn merge(
    snapshots: &[SourceSnapshot],
    policy: &PriorityPolicy,
) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
    let mut keys: BTreeSet<&ConfigKey> = BTreeSet::new();
    for snapshot in snapshots {
        keys.extend(snapshot.values.keys());
    }

    let mut merged: BTreeMap<ConfigKey, ConfigValue> = BTreeMap::new();
    // The ordering position each winning value came from, kept for conflict
    // resolution under LastSourceWins.
    let mut winners: BTreeMap<ConfigKey, usize> = BTreeMap::new();

    for key in keys {
        let ordering = policy.order_for(key.as_str());
        let mut winner: Option<(usize, &ConfigValue)> = None;
        for (position, source_id) in ordering.iter().enumerate() {
            for snapshot in snapshots {
                if &snapshot.id == source_id {
                    if let Some(value) = snapshot.values.get(key) {
                        winner = Some((position, value));
                    }
                }
            }
        }
        match winner {
            Some((position, value)) => {
                trace!(key = key.as_str(), source = %ordering[position], "key resolved");
                merged.insert(key.clone(), value.clone());
                winners.insert(key.clone(), position);
            }
            None => {
                trace!(
                    key = key.as_str(),
                    "no source in the governing ordering provides this key"
                );
            }
        }
    }

    resolve_structure_conflicts(&mut merged, &winners, policy.conflict_policy())?;

    debug!(keys = merged.len(), "merge complete");
    Ok(merged)
}

/// Detects keys that are both leaves and parents after the merge and either
/// rejects them or drops the losing side.
///
/// A map-shaped value (a structured map, or a string holding a JSON object)
/// sitting at a parent path is a subtree rather than a scalar collision and
/// is left for the binder to expand, with explicit dotted keys winning.
///
/// Under [`ConflictPolicy::LastSourceWins`] each side's position is its
/// index within that key's own governing ordering; colliding keys routed to
/// different orderings by an override are still compared positionally.
fn resolve_structure_conflicts(
    merged: &mut BTreeMap<ConfigKey, ConfigValue>,
    winners: &BTreeMap<ConfigKey, usize>,
    policy: ConflictPolicy,
) -> Result<()> {
    let leaves: Vec<ConfigKey> = merged.keys().cloned().collect();
    for leaf in leaves {
        let Some(value) = merged.get(&leaf) else {
            continue;
        };
        if is_subtree_value(value) {
            continue;
        }
        let children: Vec<ConfigKey> = merged
            .keys()
            .filter(|k| k.is_child_of(leaf.as_str()))
            .cloned()
            .collect();
        if children.is_empty() {
            continue;
        }
        match policy {
            ConflictPolicy::Reject => {
                return Err(ConfigError::MergeConflict {
                    key: leaf.into_string(),
                });
            }
            ConflictPolicy::LastSourceWins => {
                let leaf_position = winners.get(&leaf).copied().unwrap_or(0);
                let children_position = children
                    .iter()
                    .filter_map(|k| winners.get(k).copied())
                    .max()
                    .unwrap_or(0);
                if leaf_position > children_position {
                    debug!(key = leaf.as_str(), "leaf value shadows nested keys");
                    for child in children {
                        merged.remove(&child);
                    }
                } else {
                    debug!(key = leaf.as_str(), "nested keys shadow leaf value");
                    merged.remove(&leaf);
                }
            }
        }
    }
    Ok(())
}

fn is_subtree_value(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::Map(_) => true,
        ConfigValue::Str(s) => serde_json::from_str::<serde_json::Value>(s)
            .map(|parsed| parsed.is_object())
            .unwrap_or(false),
        _ => false,
    }
}
