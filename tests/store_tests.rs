// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the store: reload semantics, subscriptions, and
//! live updates from watched files.

use varlord::prelude::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::time::{Duration, Instant};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .try_init()
            .ok();
    });
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    false
}

/// A source whose contents can be swapped between loads.
struct MutableSource {
    handle: Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>,
}

impl MutableSource {
    fn new(entries: &[(&str, &str)]) -> (Self, Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>) {
        let map: BTreeMap<ConfigKey, ConfigValue> = entries
            .iter()
            .map(|(k, v)| (ConfigKey::from(*k), ConfigValue::from(*v)))
            .collect();
        let handle = Arc::new(Mutex::new(map));
        (
            Self {
                handle: Arc::clone(&handle),
            },
            handle,
        )
    }
}

impl ConfigSource for MutableSource {
    fn id(&self) -> &str {
        "mutable"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        Ok(self.handle.lock().unwrap().clone())
    }
}

/// A watch-capable source driven entirely by the test: events are fed
/// through a channel handed out at construction, and loads are counted.
struct WatchableSource {
    handle: Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>,
    loads: Arc<AtomicUsize>,
    stream: Mutex<Option<mpsc::Receiver<ChangeEvent>>>,
}

impl WatchableSource {
    fn new(
        entries: &[(&str, &str)],
    ) -> (
        Self,
        Arc<Mutex<BTreeMap<ConfigKey, ConfigValue>>>,
        Arc<AtomicUsize>,
        mpsc::Sender<ChangeEvent>,
    ) {
        let map: BTreeMap<ConfigKey, ConfigValue> = entries
            .iter()
            .map(|(k, v)| (ConfigKey::from(*k), ConfigValue::from(*v)))
            .collect();
        let handle = Arc::new(Mutex::new(map));
        let loads = Arc::new(AtomicUsize::new(0));
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                handle: Arc::clone(&handle),
                loads: Arc::clone(&loads),
                stream: Mutex::new(Some(receiver)),
            },
            handle,
            loads,
            sender,
        )
    }
}

impl ConfigSource for WatchableSource {
    fn id(&self) -> &str {
        "watched"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.handle.lock().unwrap().clone())
    }

    fn supports_watch(&self) -> bool {
        true
    }

    fn watch(&self) -> Result<mpsc::Receiver<ChangeEvent>> {
        Ok(self
            .stream
            .lock()
            .unwrap()
            .take()
            .expect("watch started once"))
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
fn test_readers_never_block_during_reloads() {
    init_tracing();
    let (source, handle) = MutableSource::new(&[("name", "v0")]);
    let store = Arc::new(
        ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap(),
    );

    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        readers.push(std::thread::spawn(move || {
            for _ in 0..500 {
                // Every observed snapshot must be complete and bound.
                let snapshot = store.get();
                assert!(snapshot.get_str("name").is_some());
                assert!(snapshot.get_u64("port").is_some());
            }
        }));
    }

    for round in 0..50 {
        handle.lock().unwrap().insert(
            ConfigKey::from("name"),
            ConfigValue::from(format!("v{round}")),
        );
        store.reload().unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn test_concurrent_reloads_are_serialized() {
    init_tracing();
    let (source, handle) = MutableSource::new(&[("name", "start")]);
    let store = Arc::new(
        ConfigStore::builder(schema())
            .with_defaults()
            .source(source)
            .build()
            .unwrap(),
    );

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    store.subscribe(move |snapshot, diff| {
        assert!(!diff.is_empty());
        sink.lock().unwrap().push(snapshot.get_str("name").unwrap());
    });

    let mut reloaders = Vec::new();
    for thread_id in 0..4 {
        let store = Arc::clone(&store);
        let handle = Arc::clone(&handle);
        reloaders.push(std::thread::spawn(move || {
            for round in 0..20 {
                handle.lock().unwrap().insert(
                    ConfigKey::from("name"),
                    ConfigValue::from(format!("t{thread_id}r{round}")),
                );
                // A racing reload may observe no change; both outcomes are
                // legal, a failure is not.
                store.reload().unwrap();
            }
        }));
    }
    for reloader in reloaders {
        reloader.join().unwrap();
    }

    // Publishes are serialized and notified in publish order, and `name`
    // is the only key that ever changes, so a serial history shows no
    // consecutive repeats.
    let observed = observed.lock().unwrap();
    assert!(!observed.is_empty());
    for pair in observed.windows(2) {
        assert_ne!(pair[0], pair[1], "duplicate consecutive publish");
    }
    // The last notified snapshot is the one the store still serves.
    assert_eq!(
        store.get().get_str("name"),
        observed.last().cloned()
    );
}

#[test]
fn test_five_events_in_window_cause_one_reload_and_one_notification() {
    init_tracing();
    let (source, handle, loads, events) = WatchableSource::new(&[("name", "v0")]);
    let store = ConfigStore::builder(schema())
        .with_defaults()
        .source(source)
        .debounce(Duration::from_millis(300))
        .build()
        .unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    store.subscribe(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    handle
        .lock()
        .unwrap()
        .insert(ConfigKey::from("name"), ConfigValue::from("v1"));
    // Five events land in the queue before the listener can even finish
    // its first coalescing window.
    for _ in 0..5 {
        events
            .send(ChangeEvent::put(
                ConfigKey::from("name"),
                None,
                ConfigValue::from("v1"),
            ))
            .unwrap();
    }

    assert!(wait_until(Duration::from_secs(5), || {
        loads.load(Ordering::SeqCst) == 2
    }));
    // Give the listener ample time to misbehave before pinning the counts.
    std::thread::sleep(Duration::from_millis(700));
    assert_eq!(loads.load(Ordering::SeqCst), 2, "burst caused extra reloads");
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(store.get().get_str("name"), Some("v1".to_string()));
}

#[cfg(all(feature = "dotenv", feature = "watch"))]
mod watch {
    use super::*;

    #[test]
    fn test_file_edit_updates_snapshot() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NAME=initial\n").unwrap();

        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(DotEnvSource::new(&path))
            .debounce(Duration::from_millis(50))
            .build()
            .unwrap();
        assert_eq!(store.get().get_str("name"), Some("initial".to_string()));

        std::fs::write(&path, "NAME=updated\n").unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            store.get().get_str("name") == Some("updated".to_string())
        }));
    }

    #[test]
    fn test_burst_of_edits_coalesces_notifications() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NAME=v0\n").unwrap();

        let store = ConfigStore::builder(schema())
            .with_defaults()
            .source(DotEnvSource::new(&path))
            .debounce(Duration::from_millis(300))
            .build()
            .unwrap();

        let notifications = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&notifications);
        store.subscribe(move |_, _| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        for round in 1..=5 {
            std::fs::write(&path, format!("NAME=v{round}\n")).unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }

        assert!(wait_until(Duration::from_secs(5), || {
            store.get().get_str("name") == Some("v5".to_string())
        }));
        // The burst lands within the coalescing window: far fewer
        // notifications than edits.
        assert!(notifications.load(Ordering::SeqCst) < 5);
    }

    #[test]
    fn test_broken_edit_keeps_previous_snapshot_until_fixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "NAME=good\n").unwrap();

        let store = ConfigStore::builder(schema())
            .source(DotEnvSource::new(&path))
            .debounce(Duration::from_millis(50))
            .build()
            .unwrap();

        // Remove the only provider of the required field.
        std::fs::write(&path, "OTHER=1\n").unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            store.last_error().is_some()
        }));
        assert_eq!(store.get().get_str("name"), Some("good".to_string()));

        std::fs::write(&path, "NAME=fixed\n").unwrap();
        assert!(wait_until(Duration::from_secs(5), || {
            store.get().get_str("name") == Some("fixed".to_string())
        }));
        assert!(store.last_error().is_none());
    }
}
