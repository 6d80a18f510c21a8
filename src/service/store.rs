// SPDX-License-Identifier: MIT OR Apache-2.0

//! The configuration store: the crate's orchestrating service.
//!
//! The store owns the sources, the policy, and the schema, and publishes
//! immutable snapshots through an atomically swapped pointer. Readers never
//! block: `get` is a lock-free pointer load, and a snapshot obtained before
//! a reload stays valid for as long as the caller holds it. Reloads are
//! serialized; a failed reload keeps the previous snapshot live.

use crate::domain::binder::bind;
use crate::domain::errors::{ConfigError, Result};
use crate::domain::key::normalize_key;
use crate::domain::policy::PriorityPolicy;
use crate::domain::resolver::{merge, SourceSnapshot};
use crate::domain::schema::Schema;
use crate::domain::snapshot::{ConfigDiff, ConfigSnapshot};
use crate::ports::source::ConfigSource;
use arc_swap::ArcSwap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A change notification callback.
pub type Subscriber = dyn Fn(&ConfigSnapshot, &ConfigDiff) + Send + Sync;

/// Identifies one subscription, for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct StoreInner {
    schema: Schema,
    policy: PriorityPolicy,
    sources: Vec<Box<dyn ConfigSource>>,
    snapshot: ArcSwap<ConfigSnapshot>,
    reload_lock: Mutex<()>,
    subscribers: Mutex<Vec<(SubscriptionId, Arc<Subscriber>)>>,
    next_subscription: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl StoreInner {
    /// Loads every source, skipping ones that fail, and returns the
    /// snapshots in registration order.
    fn load_sources(&self) -> Vec<SourceSnapshot> {
        let mut snapshots = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match source.load() {
                Ok(values) => {
                    // Re-normalizing is a no-op for well-behaved sources and
                    // shields the merge from ones that skipped it.
                    let values = values
                        .into_iter()
                        .map(|(key, value)| (normalize_key(key.as_str()), value))
                        .collect::<std::collections::BTreeMap<_, _>>();
                    debug!(source = source.id(), keys = values.len(), "source loaded");
                    snapshots.push(SourceSnapshot::new(source.id(), values));
                }
                Err(err) => {
                    // A failed source contributes nothing this cycle.
                    warn!(source = source.id(), error = %err, "source failed to load");
                }
            }
        }
        snapshots
    }

    /// Runs one full load, merge, and bind cycle.
    fn resolve(&self) -> Result<ConfigSnapshot> {
        let snapshots = self.load_sources();
        let merged = merge(&snapshots, &self.policy)?;
        bind(&merged, &self.schema)
    }

    /// Serialized reload. On failure the previous snapshot stays live and
    /// the cause is recorded; on success with a non-empty diff the new
    /// snapshot is published and subscribers are notified.
    fn reload(self: &Arc<Self>) -> Result<ConfigDiff> {
        let _guard = self
            .reload_lock
            .lock()
            .expect("reload lock poisoned");
        let new = match self.resolve() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let wrapped = err.into_reload();
                error!(error = %wrapped, "reload failed");
                *self.last_error.lock().expect("error slot poisoned") =
                    Some(wrapped.to_string());
                return Err(wrapped);
            }
        };
        let old = self.snapshot.load_full();
        let diff = ConfigDiff::between(&old, &new);
        *self.last_error.lock().expect("error slot poisoned") = None;
        if diff.is_empty() {
            debug!("reload produced no changes");
            return Ok(diff);
        }
        let new = Arc::new(new);
        self.snapshot.store(Arc::clone(&new));
        info!(changes = diff.len(), "new configuration published");
        self.notify(&new, &diff);
        Ok(diff)
    }

    fn notify(&self, snapshot: &ConfigSnapshot, diff: &ConfigDiff) {
        let subscribers: Vec<(SubscriptionId, Arc<Subscriber>)> = self
            .subscribers
            .lock()
            .expect("subscriber list poisoned")
            .clone();
        for (id, subscriber) in subscribers {
            // A panicking subscriber must not take down the listener
            // thread or starve the remaining subscribers.
            let outcome = catch_unwind(AssertUnwindSafe(|| subscriber(snapshot, diff)));
            if outcome.is_err() {
                warn!(subscription = id.0, "subscriber panicked during notification");
            }
        }
    }
}

struct ListenerHandle {
    stop: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

/// Builder for [`ConfigStore`].
///
/// Sources are registered in ascending priority: when no explicit policy is
/// set, the default ordering is the registration order, so later sources
/// override earlier ones.
pub struct ConfigStoreBuilder {
    schema: Schema,
    policy: Option<PriorityPolicy>,
    sources: Vec<Box<dyn ConfigSource>>,
    debounce: Duration,
}

impl ConfigStoreBuilder {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            policy: None,
            sources: Vec::new(),
            debounce: Duration::from_millis(200),
        }
    }

    /// Registers a source. Later registrations override earlier ones under
    /// the default policy.
    pub fn source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Registers the schema's own defaults as the lowest-priority source.
    pub fn with_defaults(self) -> Self {
        let defaults = crate::adapters::defaults::DefaultsSource::new(&self.schema);
        let mut builder = self;
        builder.sources.insert(0, Box::new(defaults));
        builder
    }

    /// Replaces the registration-order policy with an explicit one.
    pub fn policy(mut self, policy: PriorityPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the window within which change events from one source are
    /// coalesced into a single reload.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Validates the schema, performs the initial load and bind, and starts
    /// a listener for every watch-capable source.
    ///
    /// Fails if the schema is invalid or the initial configuration does not
    /// bind; a store is never handed out without a valid snapshot.
    pub fn build(self) -> Result<ConfigStore> {
        self.schema.validate()?;
        let policy = self.policy.unwrap_or_else(|| {
            PriorityPolicy::new(self.sources.iter().map(|s| s.id().to_string()))
        });
        let inner = Arc::new(StoreInner {
            schema: self.schema,
            policy,
            sources: self.sources,
            snapshot: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            reload_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            last_error: Mutex::new(None),
        });

        let initial = inner.resolve()?;
        info!(keys = initial.flat().len(), "configuration initialized");
        inner.snapshot.store(Arc::new(initial));

        let mut listeners = Vec::new();
        for index in 0..inner.sources.len() {
            let source = &inner.sources[index];
            if !source.supports_watch() {
                continue;
            }
            let events = match source.watch() {
                Ok(receiver) => receiver,
                Err(err) => {
                    warn!(source = source.id(), error = %err, "cannot watch source");
                    continue;
                }
            };
            let id = source.id().to_string();
            let (stop_tx, stop_rx) = mpsc::channel();
            let store = Arc::clone(&inner);
            let window = self.debounce;
            let thread = std::thread::spawn(move || {
                listen(store, id, events, stop_rx, window);
            });
            listeners.push(ListenerHandle {
                stop: stop_tx,
                thread: Some(thread),
            });
        }

        Ok(ConfigStore { inner, listeners })
    }
}

/// Consumes one source's change events, coalescing bursts into single
/// reloads.
fn listen(
    store: Arc<StoreInner>,
    source_id: String,
    events: mpsc::Receiver<crate::ports::source::ChangeEvent>,
    stop: mpsc::Receiver<()>,
    window: Duration,
) {
    debug!(source = %source_id, "watch listener started");
    loop {
        if stop.try_recv().is_ok() {
            break;
        }
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(_first) => {
                let mut count = 1usize;
                // Absorb the rest of the burst before reloading once.
                while events.recv_timeout(window).is_ok() {
                    count += 1;
                }
                debug!(source = %source_id, events = count, "change events coalesced");
                if let Err(err) = store.reload() {
                    warn!(source = %source_id, error = %err, "reload after change failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(source = %source_id, "watch listener stopped");
}

/// Resolves, binds, and serves configuration, keeping it current while
/// watch-capable sources report changes.
///
/// # Examples
///
/// ```
/// use varlord::domain::schema::{FieldKind, FieldSpec, Schema};
/// use varlord::service::store::ConfigStore;
///
/// let schema = Schema::new(
///     "App",
///     vec![FieldSpec::optional("port", FieldKind::UInt, 8000u64)],
/// );
/// let store = ConfigStore::builder(schema)
///     .with_defaults()
///     .build()
///     .unwrap();
/// assert_eq!(store.get().get_u64("port"), Some(8000));
/// ```
pub struct ConfigStore {
    inner: Arc<StoreInner>,
    listeners: Vec<ListenerHandle>,
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("sources", &self.inner.sources.len())
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

impl ConfigStore {
    /// Starts building a store for `schema`.
    pub fn builder(schema: Schema) -> ConfigStoreBuilder {
        ConfigStoreBuilder::new(schema)
    }

    /// The current snapshot. Lock-free; the returned snapshot stays valid
    /// across later reloads.
    pub fn get(&self) -> Arc<ConfigSnapshot> {
        self.inner.snapshot.load_full()
    }

    /// Re-runs the load, merge, and bind cycle and publishes the result.
    ///
    /// Returns the diff against the previous snapshot; subscribers are only
    /// notified when the diff is non-empty. On failure the previous
    /// snapshot stays live and the error is also retained for
    /// [`ConfigStore::last_error`].
    pub fn reload(&self) -> Result<ConfigDiff> {
        self.inner.reload()
    }

    /// Registers a callback invoked after every effective reload.
    pub fn subscribe(
        &self,
        callback: impl Fn(&ConfigSnapshot, &ConfigDiff) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push((id, Arc::new(callback)));
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .expect("subscriber list poisoned");
        let before = subscribers.len();
        subscribers.retain(|(existing, _)| *existing != id);
        subscribers.len() != before
    }

    /// The failure message of the most recent reload, if it failed.
    pub fn last_error(&self) -> Option<String> {
        self.inner
            .last_error
            .lock()
            .expect("error slot poisoned")
            .clone()
    }

    /// The schema this store binds against.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Stops all watch listeners and waits for them to exit. Idempotent;
    /// also performed on drop.
    pub fn close(&mut self) {
        for listener in &mut self.listeners {
            let _ = listener.stop.send(());
        }
        for listener in &mut self.listeners {
            if let Some(thread) = listener.thread.take() {
                if thread.join().is_err() {
                    warn!("watch listener thread panicked");
                }
            }
        }
        self.listeners.clear();
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::key::ConfigKey;
    use crate::domain::schema::{FieldKind, FieldSpec};
    use crate::domain::value::ConfigValue;
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;

    /// A source whose contents can be swapped between loads.
    struct MutableSource {
        id: &'static str,
        handle: Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>,
    }

    impl MutableSource {
        fn new(
            id: &'static str,
            entries: &[(&str, &str)],
        ) -> (Self, Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>) {
            let map: BTreeMap<ConfigKey, ConfigValue> = entries
                .iter()
                .map(|(k, v)| (ConfigKey::from(*k), ConfigValue::from(*v)))
                .collect();
            let handle = Arc::new(Mutex::new(map));
            (
                Self {
                    id,
                    handle: Arc::clone(&handle),
                },
                handle,
            )
        }
    }

    impl ConfigSource for MutableSource {
        fn id(&self) -> &str {
            self.id
        }

        fn load(&self) -> crate::domain::errors::Result<BTreeMap<ConfigKey, ConfigValue>> {
            Ok(self.handle.lock().unwrap().clone())
        }
    }

    struct FailingSource;

    impl ConfigSource for FailingSource {
        fn id(&self) -> &str {
            "failing"
        }

        fn load(&self) -> crate::domain::errors::Result<BTreeMap<ConfigKey, ConfigValue>> {
            Err(ConfigError::SourceLoad {
                source_name: "failing".to_string(),
                message: "backend unavailable".to_string(),
                source: None,
            })
        }
    }

    fn schema() -> Schema {
        Schema::new(
            "App",
            vec![
                FieldSpec::required("name", FieldKind::Str),
                FieldSpec::optional("port", FieldKind::UInt, 8000u64),
            ],
        )
    }

    #[test]
    fn test_initialize_binds_and_serves() {
        let (source, _) = MutableSource::new("test", &[("name", "app")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();
        let snapshot = store.get();
        assert_eq!(snapshot.get_str("name"), Some("app".to_string()));
        assert_eq!(snapshot.get_u64("port"), Some(8000));
    }

    #[test]
    fn test_initialize_fails_on_invalid_schema() {
        let bad = Schema::new("App", vec![FieldSpec::undeclared("x", FieldKind::Str)]);
        let result = ConfigStore::builder(bad).build();
        assert!(matches!(
            result,
            Err(ConfigError::SchemaDefinition { .. })
        ));
    }

    #[test]
    fn test_initialize_fails_on_missing_required() {
        let result = ConfigStore::builder(schema()).with_defaults().build();
        assert!(matches!(result, Err(ConfigError::Bind(_))));
    }

    #[test]
    fn test_reload_publishes_changes() {
        let (source, handle) = MutableSource::new("test", &[("name", "before")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("after"));
        let diff = store.reload().unwrap();
        assert!(diff.modified.contains(&ConfigKey::from("name")));
        assert_eq!(store.get().get_str("name"), Some("after".to_string()));
    }

    #[test]
    fn test_reload_without_changes_yields_empty_diff_and_no_notification() {
        let (source, _) = MutableSource::new("test", &[("name", "app")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        store.subscribe(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.reload().unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_reload_keeps_previous_snapshot() {
        let (source, handle) = MutableSource::new("test", &[("name", "app")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        // Remove the only provider of the required field.
        handle.lock().unwrap().clear();
        let err = store.reload().unwrap_err();
        assert!(matches!(err, ConfigError::Reload(_)));
        assert_eq!(store.get().get_str("name"), Some("app".to_string()));
        assert!(store.last_error().is_some());

        // A subsequent good reload clears the recorded failure.
        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("app"));
        store.reload().unwrap();
        assert!(store.last_error().is_none());
    }

    #[test]
    fn test_failing_source_is_skipped_not_fatal() {
        let (source, _) = MutableSource::new("test", &[("name", "app")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(FailingSource)
            .source(source)
            .build()
            .unwrap();
        assert_eq!(store.get().get_str("name"), Some("app".to_string()));
    }

    #[test]
    fn test_subscriber_receives_snapshot_and_diff() {
        let (source, handle) = MutableSource::new("test", &[("name", "before")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |snapshot, diff| {
            sink.lock()
                .unwrap()
                .push((snapshot.get_str("name"), diff.clone()));
        });

        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("after"));
        store.reload().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Some("after".to_string()));
        assert!(seen[0].1.modified.contains(&ConfigKey::from("name")));
    }

    #[test]
    fn test_panicking_subscriber_does_not_poison_others() {
        let (source, handle) = MutableSource::new("test", &[("name", "before")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        store.subscribe(|_, _| panic!("misbehaving subscriber"));
        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        store.subscribe(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("after"));
        store.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let (source, handle) = MutableSource::new("test", &[("name", "a")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&calls);
        let id = store.subscribe(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));

        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("b"));
        store.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_snapshot_outlives_reload() {
        let (source, handle) = MutableSource::new("test", &[("name", "old")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();

        let pinned = store.get();
        handle
            .lock()
            .unwrap()
            .insert(ConfigKey::from("name"), ConfigValue::from("new"));
        store.reload().unwrap();

        assert_eq!(pinned.get_str("name"), Some("old".to_string()));
        assert_eq!(store.get().get_str("name"), Some("new".to_string()));
    }

    #[test]
    fn test_registration_order_is_default_priority() {
        let (low, _) = MutableSource::new("low", &[("name", "low")]);
        let (high, _) = MutableSource::new("high", &[("name", "high")]);
        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(low)
            .source(high)
            .build()
            .unwrap();
        assert_eq!(store.get().get_str("name"), Some("high".to_string()));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (source, _) = MutableSource::new("test", &[("name", "app")]);
        let mut store = ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap();
        store.close();
        store.close();
    }
}
