// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property-based tests using proptest.
//!
//! These tests verify that key normalization, the merge, and value coercion
//! hold their invariants for arbitrary inputs.

use varlord::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

// Normalization is idempotent: normalizing a normalized key changes nothing
proptest! {
    #[test]
    fn test_normalize_is_idempotent(s in "\\PC*") {
        let once = normalize_key(&s);
        let twice = normalize_key(once.as_str());
        prop_assert_eq!(once, twice);
    }
}

// Normalized keys never contain uppercase or double underscores
proptest! {
    #[test]
    fn test_normalized_keys_are_canonical(s in "[A-Za-z0-9_.]{0,40}") {
        let key = normalize_key(&s);
        prop_assert!(!key.as_str().contains("__"));
        prop_assert!(!key.as_str().chars().any(|c| c.is_ascii_uppercase()));
    }
}

// The env-var spelling and the dotted spelling of a path normalize equally
proptest! {
    #[test]
    fn test_spelling_equivalence(segments in prop::collection::vec("[a-z][a-z0-9]{0,8}", 1..4)) {
        let dotted = segments.join(".");
        let env_spelling = segments.join("__").to_uppercase();
        prop_assert_eq!(normalize_key(&dotted), normalize_key(&env_spelling));
    }
}

// The merge is deterministic and its result only contains contributed keys
proptest! {
    #[test]
    fn test_merge_deterministic_and_bounded(
        a in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..8),
        b in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 0..8),
    ) {
        let to_snapshot = |id: &str, map: &BTreeMap<String, String>| {
            SourceSnapshot::new(
                id,
                map.iter()
                    .map(|(k, v)| (ConfigKey::from(k.as_str()), ConfigValue::from(v.as_str())))
                    .collect(),
            )
        };
        let snapshots = [to_snapshot("a", &a), to_snapshot("b", &b)];
        let policy = PriorityPolicy::new(["a", "b"]);

        let first = merge(&snapshots, &policy).unwrap();
        let second = merge(&snapshots, &policy).unwrap();
        prop_assert_eq!(&first, &second);

        for (key, value) in &first {
            let from_b = snapshots[1].values.get(key);
            let from_a = snapshots[0].values.get(key);
            // Single-segment keys cannot nest, so the winner is simply the
            // later source that has the key.
            prop_assert_eq!(Some(value), from_b.or(from_a));
        }
    }
}

// Integer round trip through string coercion
proptest! {
    #[test]
    fn test_i64_coercion_round_trip(n in prop::num::i64::ANY) {
        let value = ConfigValue::from(n.to_string());
        prop_assert_eq!(value.coerce_i64("test").unwrap(), n);
    }
}

// Unsigned coercion rejects every negative integer
proptest! {
    #[test]
    fn test_u64_coercion_rejects_negatives(n in i64::MIN..0i64) {
        let value = ConfigValue::Int(n);
        prop_assert!(value.coerce_u64("test").is_err());
    }
}

// Boolean tokens parse regardless of case
proptest! {
    #[test]
    fn test_bool_tokens_case_insensitive(
        token in prop::sample::select(vec!["true", "yes", "on", "false", "no", "off"]),
        upper in prop::bool::ANY,
    ) {
        let expected = matches!(token, "true" | "yes" | "on");
        let spelled = if upper { token.to_uppercase() } else { token.to_string() };
        let value = ConfigValue::from(spelled);
        prop_assert_eq!(value.coerce_bool("test").unwrap(), expected);
    }
}

// A wildcard pattern matches every key under its prefix
proptest! {
    #[test]
    fn test_prefix_wildcard_matches_subtree(
        prefix in "[a-z]{1,6}",
        suffix in "[a-z.]{0,12}",
    ) {
        let pattern = KeyPattern::new(format!("{prefix}.*"));
        let key = format!("{prefix}.{suffix}");
        prop_assert!(pattern.matches(&key));
    }
}
