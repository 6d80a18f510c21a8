// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schema defaults exposed as a source.
//!
//! Placing defaults in the priority ordering like any other source keeps
//! the merge uniform: defaults are simply the source everything else is
//! allowed to override.

use crate::domain::errors::Result;
use crate::domain::key::ConfigKey;
use crate::domain::schema::Schema;
use crate::domain::value::ConfigValue;
use crate::ports::source::ConfigSource;
use std::collections::BTreeMap;

/// A source yielding the schema's default values under dotted keys.
///
/// # Examples
///
/// ```
/// use varlord::adapters::defaults::DefaultsSource;
/// use varlord::domain::schema::{FieldKind, FieldSpec, Schema};
/// use varlord::ports::source::ConfigSource;
///
/// let schema = Schema::new(
///     "App",
///     vec![FieldSpec::optional("port", FieldKind::UInt, 8000u64)],
/// );
/// let source = DefaultsSource::new(&schema);
/// assert_eq!(source.load().unwrap().len(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct DefaultsSource {
    values: BTreeMap<ConfigKey, ConfigValue>,
}

impl DefaultsSource {
    /// Captures the flat defaults of `schema`.
    pub fn new(schema: &Schema) -> Self {
        Self {
            values: schema.flat_defaults(),
        }
    }
}

impl ConfigSource for DefaultsSource {
    fn id(&self) -> &str {
        "defaults"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        Ok(self.values.clone())
    }
}
