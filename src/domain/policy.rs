// SPDX-License-Identifier: MIT OR Apache-2.0

//! Priority policy: which source wins a key when several provide it.
//!
//! The default rule is positional: sources later in the order override
//! earlier ones. Per-key overrides route keys matching a glob pattern to a
//! different ordering; overrides are checked in declaration order and the
//! first match governs. Resolution is always per key, never per subtree.

use std::fmt;

/// How the resolver treats a key that is simultaneously a leaf value and a
/// parent of further dotted keys after merging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Report the collision as a merge error (the default).
    #[default]
    Reject,
    /// Keep whichever side's winning value came from the later ordering
    /// position, dropping the other side. Each key's position is counted
    /// within its own governing ordering; when an override routes the leaf
    /// and its children to different orderings, positions from those
    /// orderings are compared as-is, with the children winning ties. Keys
    /// that collide are expected to share one governing ordering for the
    /// comparison to mean "later source".
    LastSourceWins,
}

/// A glob pattern over dotted keys. `*` matches any run of characters,
/// including dots; matching is anchored at the start of the key, so
/// `secrets.*` matches every key below `secrets`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPattern(String);

impl KeyPattern {
    /// Creates a pattern from its glob text.
    pub fn new(pattern: impl Into<String>) -> Self {
        KeyPattern(pattern.into())
    }

    /// The pattern's glob text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Tests whether `key` matches this pattern.
    pub fn matches(&self, key: &str) -> bool {
        glob_match(self.0.as_bytes(), key.as_bytes())
    }
}

fn glob_match(pattern: &[u8], key: &[u8]) -> bool {
    match pattern.split_first() {
        // Pattern exhausted: anchored-prefix semantics, the rest of the key
        // is irrelevant.
        None => true,
        Some((b'*', rest)) => (0..=key.len()).any(|i| glob_match(rest, &key[i..])),
        Some((&c, rest)) => key.first() == Some(&c) && glob_match(rest, &key[1..]),
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One per-pattern ordering override.
#[derive(Clone, Debug)]
pub struct PriorityOverride {
    /// Keys matching this pattern use the override ordering.
    pub pattern: KeyPattern,
    /// Source ids, later entries override earlier ones.
    pub order: Vec<String>,
}

/// Ordering rules for the resolver.
///
/// # Examples
///
/// ```
/// use varlord::domain::policy::PriorityPolicy;
///
/// let policy = PriorityPolicy::new(["defaults", "dotenv", "env", "cli"])
///     .with_override("secrets.*", ["defaults", "env"]);
///
/// assert_eq!(policy.order_for("db.host"), ["defaults", "dotenv", "env", "cli"]);
/// assert_eq!(policy.order_for("secrets.api_key"), ["defaults", "env"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct PriorityPolicy {
    default_order: Vec<String>,
    overrides: Vec<PriorityOverride>,
    on_conflict: ConflictPolicy,
}

impl PriorityPolicy {
    /// Creates a policy with the given default ordering. Later sources
    /// override earlier ones.
    pub fn new<I, S>(default_order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            default_order: default_order.into_iter().map(Into::into).collect(),
            overrides: Vec::new(),
            on_conflict: ConflictPolicy::default(),
        }
    }

    /// Appends a per-pattern override. Overrides are evaluated in the order
    /// they were added; the first matching pattern governs a key.
    pub fn with_override<I, S>(mut self, pattern: impl Into<String>, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.overrides.push(PriorityOverride {
            pattern: KeyPattern::new(pattern),
            order: order.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Sets the leaf/parent collision behavior.
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }

    /// The ordering that governs `key`: the first matching override, else
    /// the default order.
    pub fn order_for(&self, key: &str) -> &[String] {
        for override_rule in &self.overrides {
            if override_rule.pattern.matches(key) {
                return &override_rule.order;
            }
        }
        &self.default_order
    }

    /// The default ordering.
    pub fn default_order(&self) -> &[String] {
        &self.default_order
    }

    /// The configured collision behavior.
    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.on_conflict
    }
}
