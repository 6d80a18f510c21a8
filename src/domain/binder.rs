// SPDX-License-Identifier: MIT OR Apache-2.0

//! Binding: turning a merged flat key/value map into a typed snapshot.
//!
//! Binding never stops at the first problem. It walks the whole schema tree,
//! coercing every present value and applying every default, and collects all
//! missing required fields and all coercion failures into one [`BindError`]
//! so a single run reports everything the operator has to fix.

use crate::domain::errors::{BindError, CoercionFailure, ConfigError, MissingField, Result};
use crate::domain::key::{normalize_key, ConfigKey};
use crate::domain::schema::{FieldKind, Schema};
use crate::domain::snapshot::ConfigSnapshot;
use crate::domain::value::ConfigValue;
use std::collections::BTreeMap;
use tracing::debug;

/// Binds the merged flat map against `schema`, producing a typed snapshot.
///
/// Keys the schema does not declare are ignored. Values are coerced to the
/// declared field types; a structured value (or a JSON string) sitting at a
/// nested field's path is expanded into its dotted children, with explicitly
/// provided dotted keys taking precedence over the expansion.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use varlord::domain::binder::bind;
/// use varlord::domain::key::ConfigKey;
/// use varlord::domain::schema::{FieldKind, FieldSpec, Schema};
/// use varlord::domain::value::ConfigValue;
///
/// let schema = Schema::new(
///     "App",
///     vec![
///         FieldSpec::required("host", FieldKind::Str),
///         FieldSpec::optional("port", FieldKind::UInt, 8000u64),
///     ],
/// );
/// let flat = BTreeMap::from([(ConfigKey::from("host"), ConfigValue::from("0.0.0.0"))]);
///
/// let snapshot = bind(&flat, &schema).unwrap();
/// assert_eq!(snapshot.get_str("host"), Some("0.0.0.0".to_string()));
/// assert_eq!(snapshot.get_u64("port"), Some(8000));
/// ```
pub fn bind(flat: &BTreeMap<ConfigKey, ConfigValue>, schema: &Schema) -> Result<ConfigSnapshot> {
    let mut values = flat.clone();
    let mut report = BindError::default();
    let root = bind_level(&mut values, schema, "", &mut report);
    if !report.is_empty() {
        debug!(
            missing = report.missing.len(),
            coercions = report.coercions.len(),
            "binding failed"
        );
        return Err(ConfigError::Bind(report));
    }
    Ok(ConfigSnapshot::from_root(root))
}

fn bind_level(
    values: &mut BTreeMap<ConfigKey, ConfigValue>,
    schema: &Schema,
    prefix: &str,
    report: &mut BindError,
) -> BTreeMap<String, ConfigValue> {
    let mut out = BTreeMap::new();
    for field in schema.fields() {
        let path = join(prefix, field.name());
        match field.kind() {
            FieldKind::Nested(sub) => {
                expand_structured(values, &path, report);
                let provided = values
                    .keys()
                    .any(|k| k.is_child_of(&path) || k.as_str() == path);
                if provided || field.is_required() {
                    let nested = bind_level(values, sub, &path, report);
                    out.insert(field.name().to_string(), ConfigValue::Map(nested));
                } else if let Some(default) = field.default_value() {
                    out.insert(field.name().to_string(), default);
                }
            }
            kind => {
                let value = values
                    .get(&ConfigKey::from(path.as_str()))
                    .cloned()
                    .or_else(|| field.default_value());
                match value {
                    Some(value) => match coerce(&value, kind, &path) {
                        Ok(typed) => {
                            out.insert(field.name().to_string(), typed);
                        }
                        Err(failure) => report.coercions.push(failure),
                    },
                    None => report.missing.push(MissingField {
                        path: path.clone(),
                        description: field.description().map(String::from),
                    }),
                }
            }
        }
    }
    out
}

/// Expands a structured value (or a JSON string) found at a nested field's
/// exact path into dotted child keys. Explicit dotted keys win over the
/// expansion.
fn expand_structured(
    values: &mut BTreeMap<ConfigKey, ConfigValue>,
    path: &str,
    report: &mut BindError,
) {
    let key = ConfigKey::from(path);
    let Some(value) = values.remove(&key) else {
        return;
    };
    match value.coerce_map(path) {
        Ok(map) => {
            let mut flat = BTreeMap::new();
            flatten_structured(&map, path, &mut flat);
            for (child, child_value) in flat {
                values.entry(child).or_insert(child_value);
            }
        }
        Err(ConfigError::Coercion(failure)) => report.coercions.push(failure),
        Err(_) => report.coercions.push(CoercionFailure {
            key: path.to_string(),
            expected: "nested schema".to_string(),
            value: value.to_string(),
        }),
    }
}

fn flatten_structured(
    map: &BTreeMap<String, ConfigValue>,
    prefix: &str,
    out: &mut BTreeMap<ConfigKey, ConfigValue>,
) {
    for (name, value) in map {
        let path = format!("{}.{}", prefix, normalize_key(name).as_str());
        match value {
            ConfigValue::Map(sub) => flatten_structured(sub, &path, out),
            leaf => {
                out.insert(ConfigKey::new(path), leaf.clone());
            }
        }
    }
}

fn coerce(
    value: &ConfigValue,
    kind: &FieldKind,
    path: &str,
) -> std::result::Result<ConfigValue, CoercionFailure> {
    let coerced = match kind {
        FieldKind::Str => value.coerce_str(path).map(ConfigValue::Str),
        FieldKind::Bool => value.coerce_bool(path).map(ConfigValue::Bool),
        FieldKind::Int => value.coerce_i64(path).map(ConfigValue::Int),
        FieldKind::UInt => value.coerce_u64(path).map(ConfigValue::UInt),
        FieldKind::Float => value.coerce_f64(path).map(ConfigValue::Float),
        FieldKind::List => value.coerce_list(path).map(ConfigValue::List),
        FieldKind::Nested(_) => unreachable!("nested fields are bound recursively"),
    };
    coerced.map_err(|err| match err {
        ConfigError::Coercion(failure) => failure,
        other => CoercionFailure {
            key: path.to_string(),
            expected: kind.type_name().to_string(),
            value: other.to_string(),
        },
    })
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}
