// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line argument source.
//!
//! Accepts `--key=value` and `--key value` pairs; a flag with no value is
//! treated as boolean `true`. Flag names are normalized like any other raw
//! key, so `--db.host` and `--DB__HOST` both yield `db.host`. Hyphenated
//! spellings such as `--db-host` are only recognized through the alias
//! table derived from a schema with [`CommandLineSource::with_schema`].

use crate::domain::errors::Result;
use crate::domain::key::{normalize_key, ConfigKey};
use crate::domain::schema::Schema;
use crate::domain::value::ConfigValue;
use crate::ports::source::ConfigSource;
use std::collections::BTreeMap;
use tracing::trace;

/// A source parsing command-line arguments.
///
/// # Examples
///
/// ```
/// use varlord::adapters::cli::CommandLineSource;
/// use varlord::domain::key::ConfigKey;
/// use varlord::ports::source::ConfigSource;
///
/// let source = CommandLineSource::from_args(["--db.host=localhost", "--debug"]);
/// let values = source.load().unwrap();
/// assert!(values.contains_key(&ConfigKey::from("db.host")));
/// assert!(values.contains_key(&ConfigKey::from("debug")));
/// ```
pub struct CommandLineSource {
    args: Vec<String>,
    aliases: BTreeMap<String, ConfigKey>,
}

impl CommandLineSource {
    /// Parses the process arguments, skipping the program name.
    pub fn new() -> Self {
        Self::from_args(std::env::args().skip(1))
    }

    /// Parses the given argument list.
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            aliases: BTreeMap::new(),
        }
    }

    /// Derives hyphenated flag aliases from the schema's leaf paths, so
    /// `--db-host` resolves to `db.host` and `--api-key` to `api_key`.
    pub fn with_schema(mut self, schema: &Schema) -> Self {
        for (path, _) in schema.leaf_paths() {
            let alias = path.replace(['.', '_'], "-");
            self.aliases.insert(alias, ConfigKey::new(path));
        }
        self
    }

    fn key_for(&self, flag: &str) -> ConfigKey {
        match self.aliases.get(flag) {
            Some(key) => key.clone(),
            None => normalize_key(flag),
        }
    }
}

impl Default for CommandLineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for CommandLineSource {
    fn id(&self) -> &str {
        "cli"
    }

    fn name(&self) -> &str {
        "command line arguments"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        let mut out = BTreeMap::new();
        let mut args = self.args.iter().peekable();
        while let Some(arg) = args.next() {
            if arg == "--" {
                break;
            }
            let Some(flag) = arg.strip_prefix("--") else {
                trace!(argument = %arg, "skipping positional argument");
                continue;
            };
            if flag.is_empty() {
                continue;
            }
            if let Some((name, value)) = flag.split_once('=') {
                out.insert(self.key_for(name), ConfigValue::Str(value.to_string()));
                continue;
            }
            match args.peek() {
                Some(next) if !next.starts_with("--") => {
                    let value = args.next().map(String::as_str).unwrap_or_default();
                    out.insert(self.key_for(flag), ConfigValue::Str(value.to_string()));
                }
                _ => {
                    // A bare flag is a boolean switch.
                    out.insert(self.key_for(flag), ConfigValue::Bool(true));
                }
            }
        }
        Ok(out)
    }
}
