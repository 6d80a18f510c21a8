// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core domain types and algorithms.
//!
//! This module contains the pure heart of the crate: key normalization,
//! typed values, schemas, the priority merge, the binder, and snapshots.
//! Nothing in here performs I/O; sources and the store build on top.

pub mod binder;
pub mod errors;
pub mod key;
pub mod policy;
pub mod resolver;
pub mod schema;
pub mod snapshot;
pub mod value;

pub use binder::bind;
pub use errors::{BindError, CoercionFailure, ConfigError, MissingField, Result};
pub use key::{normalize_key, ConfigKey};
pub use policy::{ConflictPolicy, KeyPattern, PriorityOverride, PriorityPolicy};
pub use resolver::{merge, SourceSnapshot};
pub use schema::{DefaultFactory, FieldKind, FieldSpec, Requiredness, Schema};
pub use snapshot::{ConfigDiff, ConfigSnapshot};
pub use value::ConfigValue;
