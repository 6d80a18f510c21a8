// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process environment source.
//!
//! Variable names are matched against an optional prefix, the prefix is
//! stripped, and the remainder is normalized: lowercased, with each double
//! underscore becoming a dot. `APP__DB__HOST` with prefix `APP__` thus
//! yields the key `db.host`, while single underscores survive, so
//! `APP__API_KEY` yields `api_key`.

use crate::domain::errors::Result;
use crate::domain::key::{normalize_key, ConfigKey};
use crate::domain::value::ConfigValue;
use crate::ports::source::ConfigSource;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::trace;

/// Maps a raw (prefix-stripped) variable name to a config key.
pub type KeyMapper = Arc<dyn Fn(&str) -> ConfigKey + Send + Sync>;

/// A source reading the process environment.
///
/// # Examples
///
/// ```
/// use varlord::adapters::env::EnvSource;
/// use varlord::ports::source::ConfigSource;
///
/// let source = EnvSource::with_prefix("MYAPP__");
/// let values = source.load().unwrap();
/// ```
pub struct EnvSource {
    prefix: Option<String>,
    mapper: Option<KeyMapper>,
    // Fixed variables for tests; None means read the real environment.
    fixed: Option<BTreeMap<String, String>>,
}

impl EnvSource {
    /// Reads every environment variable.
    pub fn new() -> Self {
        Self {
            prefix: None,
            mapper: None,
            fixed: None,
        }
    }

    /// Reads only variables starting with `prefix`, stripping it before
    /// normalization.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::new()
        }
    }

    /// Replaces the default normalization with a custom key mapper. The
    /// mapper receives the variable name after prefix stripping.
    pub fn with_mapper(mut self, mapper: impl Fn(&str) -> ConfigKey + Send + Sync + 'static) -> Self {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// Uses a fixed variable map instead of the process environment.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            fixed: Some(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Self::new()
        }
    }

    /// Restricts a fixed-value source to a prefix.
    pub fn prefixed(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn variables(&self) -> Vec<(String, String)> {
        match &self.fixed {
            Some(fixed) => fixed.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => std::env::vars().collect(),
        }
    }

    fn key_for(&self, stripped: &str) -> ConfigKey {
        match &self.mapper {
            Some(mapper) => mapper(stripped),
            None => normalize_key(stripped),
        }
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for EnvSource {
    fn id(&self) -> &str {
        "env"
    }

    fn name(&self) -> &str {
        "environment variables"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        let mut out = BTreeMap::new();
        for (name, value) in self.variables() {
            let stripped = match &self.prefix {
                Some(prefix) => match name.strip_prefix(prefix.as_str()) {
                    Some(rest) if !rest.is_empty() => rest,
                    _ => continue,
                },
                None => name.as_str(),
            };
            let key = self.key_for(stripped);
            trace!(variable = %name, key = key.as_str(), "environment variable mapped");
            out.insert(key, ConfigValue::Str(value));
        }
        Ok(out)
    }
}
