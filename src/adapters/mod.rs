// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in configuration sources.

#[cfg(feature = "cli")]
pub mod cli;
pub mod defaults;
#[cfg(feature = "dotenv")]
pub mod dotenv;
#[cfg(feature = "env")]
pub mod env;

#[cfg(feature = "cli")]
pub use cli::CommandLineSource;
pub use defaults::DefaultsSource;
#[cfg(feature = "dotenv")]
pub use dotenv::DotEnvSource;
#[cfg(feature = "env")]
pub use env::EnvSource;
