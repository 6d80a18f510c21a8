// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed configuration schema: a tree of field specifications.
//!
//! A [`Schema`] is fixed at startup and never changes. Every field carries an
//! explicit requiredness declaration; a schema that leaves one out is invalid
//! and is rejected by [`Schema::validate`] before any binding is attempted.
//! Requiredness is never inferred from the presence or absence of a default.

use crate::domain::errors::{ConfigError, Result};
use crate::domain::key::ConfigKey;
use crate::domain::value::ConfigValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Whether a field must be provided by some source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Requiredness {
    /// The field must be present in the merged configuration.
    Required,
    /// The field falls back to its default when absent.
    Optional,
}

/// The declared type of a field.
#[derive(Clone, Debug)]
pub enum FieldKind {
    /// A string field.
    Str,
    /// A boolean field.
    Bool,
    /// A signed integer field.
    Int,
    /// An unsigned integer field.
    UInt,
    /// A floating point field.
    Float,
    /// A list field.
    List,
    /// A nested schema; keys below this field share its dotted prefix.
    Nested(Schema),
}

impl FieldKind {
    /// Human-readable name of the declared type, used in error reports.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Str => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Int => "integer",
            FieldKind::UInt => "unsigned integer",
            FieldKind::Float => "float",
            FieldKind::List => "list",
            FieldKind::Nested(_) => "nested schema",
        }
    }
}

/// A factory producing a default value at bind time.
pub type DefaultFactory = Arc<dyn Fn() -> ConfigValue + Send + Sync>;

/// Specification of one field in a schema.
///
/// # Examples
///
/// ```
/// use varlord::domain::schema::{FieldKind, FieldSpec};
///
/// let host = FieldSpec::required("host", FieldKind::Str).describe("bind address");
/// let port = FieldSpec::optional("port", FieldKind::UInt, 8000u64);
/// ```
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    requiredness: Option<Requiredness>,
    default: Option<ConfigValue>,
    default_factory: Option<DefaultFactory>,
    description: Option<String>,
}

impl FieldSpec {
    /// Declares a field with no requiredness. `Schema::validate` rejects
    /// schemas containing such fields; prefer [`FieldSpec::required`] or
    /// [`FieldSpec::optional`].
    pub fn undeclared(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            requiredness: None,
            default: None,
            default_factory: None,
            description: None,
        }
    }

    /// Declares a required field.
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            requiredness: Some(Requiredness::Required),
            ..Self::undeclared(name, kind)
        }
    }

    /// Declares an optional field with a default value.
    pub fn optional(
        name: impl Into<String>,
        kind: FieldKind,
        default: impl Into<ConfigValue>,
    ) -> Self {
        Self {
            requiredness: Some(Requiredness::Optional),
            default: Some(default.into()),
            ..Self::undeclared(name, kind)
        }
    }

    /// Declares an optional field whose default is produced by a factory at
    /// bind time.
    pub fn optional_with_factory(
        name: impl Into<String>,
        kind: FieldKind,
        factory: impl Fn() -> ConfigValue + Send + Sync + 'static,
    ) -> Self {
        Self {
            requiredness: Some(Requiredness::Optional),
            default_factory: Some(Arc::new(factory)),
            ..Self::undeclared(name, kind)
        }
    }

    /// Declares a required nested-schema field.
    pub fn nested(name: impl Into<String>, schema: Schema) -> Self {
        Self::required(name, FieldKind::Nested(schema))
    }

    /// Declares an optional nested-schema field. When no source provides any
    /// key under its prefix, the sub-schema's own defaults are materialized
    /// recursively, so the field is never left unset.
    pub fn nested_optional(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            requiredness: Some(Requiredness::Optional),
            ..Self::undeclared(name, FieldKind::Nested(schema))
        }
    }

    /// Attaches help text, surfaced in missing-required reports.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// The field's name (a single dotted-path segment).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field's declared type.
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// The field's explicit requiredness, if declared.
    pub fn requiredness(&self) -> Option<Requiredness> {
        self.requiredness
    }

    /// True if the field was declared required.
    pub fn is_required(&self) -> bool {
        self.requiredness == Some(Requiredness::Required)
    }

    /// The field's help text, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Produces the field's default value, if it has one.
    ///
    /// For optional nested fields without an explicit default, the sub-schema
    /// defaults are materialized recursively.
    pub fn default_value(&self) -> Option<ConfigValue> {
        if let Some(value) = &self.default {
            return Some(value.clone());
        }
        if let Some(factory) = &self.default_factory {
            return Some(factory());
        }
        if self.requiredness == Some(Requiredness::Optional) {
            if let FieldKind::Nested(sub) = &self.kind {
                return Some(ConfigValue::Map(sub.defaults()));
            }
        }
        None
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("requiredness", &self.requiredness)
            .field("default", &self.default)
            .field("has_factory", &self.default_factory.is_some())
            .finish()
    }
}

/// A named, ordered collection of field specifications.
///
/// # Examples
///
/// ```
/// use varlord::domain::schema::{FieldKind, FieldSpec, Schema};
///
/// let db = Schema::new(
///     "Db",
///     vec![
///         FieldSpec::required("host", FieldKind::Str),
///         FieldSpec::optional("port", FieldKind::UInt, 5432u64),
///     ],
/// );
/// let schema = Schema::new("AppConfig", vec![FieldSpec::nested("db", db)]);
/// assert!(schema.validate().is_ok());
/// ```
#[derive(Clone, Debug)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Creates a schema from a field list. Call [`Schema::validate`] before
    /// binding; the store does so on `initialize`.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// The schema's name, used in error reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The schema's fields, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Validates the schema definition. This is a definition-time check,
    /// performed before any load or bind:
    ///
    /// - every field must carry an explicit requiredness declaration;
    /// - field names must be unique within one schema level;
    /// - an optional leaf must have a default or a default factory;
    /// - an optional nested field's sub-schema must be able to produce
    ///   defaults, i.e. contain no required fields anywhere below.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(self.definition_error(field, "duplicate field name"));
            }
            let requiredness = field.requiredness.ok_or_else(|| {
                self.definition_error(
                    field,
                    "must be declared required or optional (requiredness is never inferred)",
                )
            })?;
            match (&field.kind, requiredness) {
                (FieldKind::Nested(sub), Requiredness::Required) => sub.validate()?,
                (FieldKind::Nested(sub), Requiredness::Optional) => {
                    sub.validate()?;
                    if field.default.is_none()
                        && field.default_factory.is_none()
                        && sub.has_required_fields()
                    {
                        return Err(self.definition_error(
                            field,
                            "optional nested field's sub-schema contains required \
                             fields, so no default instance can be produced",
                        ));
                    }
                }
                (_, Requiredness::Optional) => {
                    if field.default.is_none() && field.default_factory.is_none() {
                        return Err(self.definition_error(
                            field,
                            "optional field needs a default value or default factory",
                        ));
                    }
                }
                (_, Requiredness::Required) => {}
            }
        }
        Ok(())
    }

    /// True if any field at any depth is required.
    fn has_required_fields(&self) -> bool {
        self.fields.iter().any(|f| {
            f.is_required()
                || matches!(&f.kind, FieldKind::Nested(sub) if sub.has_required_fields())
        })
    }

    /// Materializes the nested default instance of this schema: every
    /// optional field's default, recursing into nested schemas.
    pub fn defaults(&self) -> BTreeMap<String, ConfigValue> {
        let mut out = BTreeMap::new();
        for field in &self.fields {
            match &field.kind {
                FieldKind::Nested(sub) => {
                    if let Some(value) = field.default_value() {
                        out.insert(field.name.clone(), value);
                    } else if field.is_required() {
                        // Required nested fields still surface the defaults of
                        // their optional leaves.
                        let sub_defaults = sub.defaults();
                        if !sub_defaults.is_empty() {
                            out.insert(field.name.clone(), ConfigValue::Map(sub_defaults));
                        }
                    }
                }
                _ => {
                    if let Some(value) = field.default_value() {
                        out.insert(field.name.clone(), value);
                    }
                }
            }
        }
        out
    }

    /// Flattens [`Schema::defaults`] into dotted keys, the shape the
    /// defaults source and the resolver work with.
    pub fn flat_defaults(&self) -> BTreeMap<ConfigKey, ConfigValue> {
        let mut out = BTreeMap::new();
        flatten_defaults(&self.defaults(), "", &mut out);
        out
    }

    /// All leaf field paths of this schema in dotted form, with their specs.
    pub fn leaf_paths(&self) -> Vec<(String, &FieldSpec)> {
        let mut out = Vec::new();
        self.collect_leaf_paths("", &mut out);
        out
    }

    fn collect_leaf_paths<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a FieldSpec)>) {
        for field in &self.fields {
            let path = if prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{}.{}", prefix, field.name)
            };
            match &field.kind {
                FieldKind::Nested(sub) => sub.collect_leaf_paths(&path, out),
                _ => out.push((path, field)),
            }
        }
    }

    fn definition_error(&self, field: &FieldSpec, reason: &str) -> ConfigError {
        ConfigError::SchemaDefinition {
            schema: self.name.clone(),
            field: field.name.clone(),
            reason: reason.to_string(),
        }
    }
}

fn flatten_defaults(
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
            ConfigValue::Map(sub) => flatten_defaults(sub, &path, out),
            other => {
                out.insert(ConfigKey::new(path), other.clone());
            }
        }
    }
}
