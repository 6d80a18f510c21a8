// SPDX-License-Identifier: MIT OR Apache-2.0

//! The orchestrating service layer.

pub mod store;

pub use store::{ConfigStore, ConfigStoreBuilder, SubscriptionId};
