// SPDX-License-Identifier: MIT OR Apache-2.0

//! The configuration source port.
//!
//! A source is anything that can produce a flat map of normalized keys and
//! values: process environment, a dotenv file, command-line arguments,
//! schema defaults. Sources that can observe changes additionally expose a
//! watch stream of [`ChangeEvent`]s.

use crate::domain::errors::Result;
use crate::domain::key::ConfigKey;
use crate::domain::value::ConfigValue;
use std::collections::BTreeMap;
use std::sync::mpsc;

/// The kind of change a watch stream observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// A key was added or its value changed.
    Put,
    /// A key was removed.
    Delete,
}

/// One observed change to a watched source.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// The normalized key that changed.
    pub key: ConfigKey,
    /// The value before the change, if the key existed.
    pub old_value: Option<ConfigValue>,
    /// The value after the change; `None` for a deletion.
    pub new_value: Option<ConfigValue>,
}

impl ChangeEvent {
    /// An addition or update event.
    pub fn put(key: ConfigKey, old_value: Option<ConfigValue>, new_value: ConfigValue) -> Self {
        Self {
            key,
            old_value,
            new_value: Some(new_value),
        }
    }

    /// A deletion event.
    pub fn delete(key: ConfigKey, old_value: ConfigValue) -> Self {
        Self {
            key,
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// Whether this event is a put or a delete.
    pub fn kind(&self) -> ChangeKind {
        if self.new_value.is_some() {
            ChangeKind::Put
        } else {
            ChangeKind::Delete
        }
    }
}

/// A provider of configuration key/value pairs.
///
/// Implementations must normalize the keys they emit and must be safe to
/// load repeatedly: every call to [`ConfigSource::load`] reads the backing
/// data fresh.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use varlord::domain::errors::Result;
/// use varlord::domain::key::ConfigKey;
/// use varlord::domain::value::ConfigValue;
/// use varlord::ports::source::ConfigSource;
///
/// struct Fixed;
///
/// impl ConfigSource for Fixed {
///     fn id(&self) -> &str {
///         "fixed"
///     }
///
///     fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
///         Ok(BTreeMap::from([(
///             ConfigKey::from("db.host"),
///             ConfigValue::from("localhost"),
///         )]))
///     }
/// }
/// ```
pub trait ConfigSource: Send + Sync {
    /// Stable identifier of this source, referenced by priority orderings.
    fn id(&self) -> &str;

    /// Human-readable label, used in logs and error reports.
    fn name(&self) -> &str {
        self.id()
    }

    /// Reads the source's current key/value pairs.
    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>>;

    /// True if this source can emit change events.
    fn supports_watch(&self) -> bool {
        false
    }

    /// Starts watching the source, returning a stream of change events.
    ///
    /// The default implementation returns an already-closed stream; sources
    /// that support watching override it. The watch stops when the receiver
    /// or the source is dropped.
    fn watch(&self) -> Result<mpsc::Receiver<ChangeEvent>> {
        let (_sender, receiver) = mpsc::channel();
        Ok(receiver)
    }
}
