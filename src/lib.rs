// SPDX-License-Identifier: MIT OR Apache-2.0

//! A layered configuration resolution and live-update engine.
//!
//! This crate merges configuration from multiple sources (schema defaults,
//! environment variables, dotenv files, command-line arguments, or anything
//! implementing the source trait), binds the result against a typed schema,
//! and serves immutable snapshots that stay current while watched sources
//! change.
//!
//! # Architecture
//!
//! The crate follows hexagonal architecture principles:
//!
//! - **Domain Layer**: Keys and normalization, typed values, schemas, the
//!   priority merge, the binder, snapshots and diffs
//! - **Ports**: The `ConfigSource` trait adapters implement
//! - **Adapters**: Built-in sources (defaults, env, dotenv, CLI)
//! - **Service**: The `ConfigStore` that orchestrates everything
//!
//! # Key Conventions
//!
//! Every source spells keys differently; all spellings collapse into one
//! canonical form: lowercase, dot-separated. `DB__HOST`, `--db.host`, and a
//! dotenv `DB__HOST=` line all resolve to `db.host`. Double underscores
//! become dots; single underscores are preserved, so `API_KEY` stays
//! `api_key`.
//!
//! # Precedence
//!
//! Sources later in the priority ordering override earlier ones, decided
//! per key. Glob-pattern overrides can route parts of the key space to a
//! different ordering, e.g. forbidding dotenv files from supplying
//! `secrets.*`.
//!
//! # Feature Flags
//!
//! - `env`: Enable the environment variable source (default)
//! - `dotenv`: Enable the dotenv file source (default)
//! - `cli`: Enable the command-line argument source (default)
//! - `watch`: Enable file watching for live updates
//! - `full`: Enable all features
//!
//! # Quick Start
//!
#![cfg_attr(all(feature = "env", feature = "cli"), doc = "```rust,no_run")]
#![cfg_attr(not(all(feature = "env", feature = "cli")), doc = "```rust,ignore")]
//! use varlord::prelude::*;
//!
//! # fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let schema = Schema::new(
//!     "App",
//!     vec![
//!         FieldSpec::required("name", FieldKind::Str).describe("application name"),
//!         FieldSpec::optional("port", FieldKind::UInt, 8000u64),
//!     ],
//! );
//!
//! let store = ConfigStore::builder(schema)
//!     .with_defaults()
//!     .source(EnvSource::with_prefix("MYAPP__"))
//!     .source(CommandLineSource::new())
//!     .build()?;
//!
//! let config = store.get();
//! println!("{} on port {}", config.get_str("name").unwrap(), config.get_u64("port").unwrap());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

/// Commonly used types and traits.
///
/// This module re-exports the most commonly used types and traits for convenient access.
pub mod prelude {
    pub use crate::domain::{
        bind, merge, normalize_key, BindError, ConfigDiff, ConfigError, ConfigKey, ConfigSnapshot,
        ConfigValue, ConflictPolicy, FieldKind, FieldSpec, KeyPattern, PriorityPolicy, Result,
        Schema, SourceSnapshot,
    };
    pub use crate::ports::{ChangeEvent, ChangeKind, ConfigSource};
    pub use crate::service::{ConfigStore, ConfigStoreBuilder, SubscriptionId};

    // Re-export adapters based on feature flags
    pub use crate::adapters::DefaultsSource;
    #[cfg(feature = "cli")]
    pub use crate::adapters::CommandLineSource;
    #[cfg(feature = "dotenv")]
    pub use crate::adapters::DotEnvSource;
    #[cfg(feature = "env")]
    pub use crate::adapters::EnvSource;
}
