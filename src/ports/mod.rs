// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ports: the traits adapters implement and the service consumes.

pub mod source;

pub use source::{ChangeEvent, ChangeKind, ConfigSource};
