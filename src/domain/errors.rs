// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the configuration engine.
//!
//! The taxonomy separates definition-time errors (an invalid schema), per-cycle
//! errors (a source failing to load, a merge conflict), and binding errors
//! (missing required fields, coercion failures). Binding errors are aggregated:
//! binding never stops at the first problem, it collects every missing required
//! path and every failed coercion into one [`BindError`] report so a caller can
//! self-diagnose without re-running.

use std::fmt;
use thiserror::Error;

/// A single value that could not be coerced to its declared field type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoercionFailure {
    /// The canonical dotted key of the field.
    pub key: String,
    /// The declared type the value should have coerced to.
    pub expected: String,
    /// A rendering of the offending value.
    pub value: String,
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': cannot coerce {:?} to {}",
            self.key, self.value, self.expected
        )
    }
}

/// A required field that was absent from the merged configuration.
///
/// Carries mapping hints for the common source conventions so the report
/// tells the operator what to set, not just what was missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingField {
    /// The canonical dotted key of the field.
    pub path: String,
    /// Schema-supplied help text, if any.
    pub description: Option<String>,
}

impl MissingField {
    /// The environment-variable spelling of this field's key.
    pub fn env_hint(&self) -> String {
        self.path.replace('.', "__").to_uppercase()
    }

    /// The command-line flag spelling of this field's key.
    pub fn cli_hint(&self) -> String {
        format!("--{}", self.path.replace(['.', '_'], "-"))
    }
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (env: {}, cli: {})",
            self.path,
            self.env_hint(),
            self.cli_hint()
        )?;
        if let Some(desc) = &self.description {
            write!(f, " - {}", desc)?;
        }
        Ok(())
    }
}

/// Aggregate binding failure: every missing required path and every coercion
/// failure found across the whole schema tree, reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindError {
    /// Missing required fields, in schema declaration order.
    pub missing: Vec<MissingField>,
    /// Values present but not coercible to their declared types.
    pub coercions: Vec<CoercionFailure>,
}

impl BindError {
    /// Returns true if no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.coercions.is_empty()
    }

    /// The canonical paths of all missing required fields.
    pub fn missing_paths(&self) -> Vec<&str> {
        self.missing.iter().map(|m| m.path.as_str()).collect()
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "configuration binding failed:")?;
        if !self.missing.is_empty() {
            writeln!(f, "  missing required fields:")?;
            for field in &self.missing {
                writeln!(f, "    - {}", field)?;
            }
        }
        if !self.coercions.is_empty() {
            writeln!(f, "  coercion failures:")?;
            for failure in &self.coercions {
                writeln!(f, "    - {}", failure)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for BindError {}

/// The main error type for configuration operations.
///
/// Marked `#[non_exhaustive]` to allow future additions without breaking
/// backwards compatibility.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The schema itself is invalid; detected before any load or bind attempt.
    #[error("invalid schema '{schema}': field '{field}': {reason}")]
    SchemaDefinition {
        /// The schema containing the offending field.
        schema: String,
        /// The offending field name.
        field: String,
        /// Why the definition was rejected.
        reason: String,
    },

    /// A source failed to load. Non-fatal to a merge: the source simply
    /// contributes nothing that cycle.
    #[error("configuration source '{source_name}' failed to load: {message}")]
    SourceLoad {
        /// The name of the source that failed.
        source_name: String,
        /// The failure description.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A key is simultaneously a leaf value and a parent of further dotted
    /// keys after merging. Fatal to that merge.
    #[error("merge conflict: key '{key}' is both a value and a parent of nested keys")]
    MergeConflict {
        /// The conflicting key.
        key: String,
    },

    /// A present value could not be coerced to its declared type.
    #[error("coercion failed for {0}")]
    Coercion(CoercionFailure),

    /// Aggregate binding failure (missing required fields and/or coercion
    /// failures across the whole tree).
    #[error(transparent)]
    Bind(#[from] BindError),

    /// A reload failed; the previous snapshot remains live.
    #[error("reload failed (previous snapshot kept): {0}")]
    Reload(#[source] Box<ConfigError>),

    /// A watch stream could not be established or failed.
    #[error("configuration watch error: {message}")]
    Watch {
        /// The failure description.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An I/O error occurred while reading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Wraps this error as a reload failure.
    pub fn into_reload(self) -> ConfigError {
        ConfigError::Reload(Box::new(self))
    }
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
