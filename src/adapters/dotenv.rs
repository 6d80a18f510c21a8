// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dotenv file source.
//!
//! Parses a `.env`-style file: one `KEY=value` per line, `#` comments, an
//! optional `export ` prefix, and single or double quotes around values.
//! Keys are normalized like environment variable names, so `DB__HOST=x`
//! yields `db.host`.
//!
//! With the `watch` feature the file can be observed for changes; edits are
//! diffed against the previously parsed state and emitted as per-key change
//! events.

use crate::domain::errors::{ConfigError, Result};
use crate::domain::key::{normalize_key, ConfigKey};
use crate::domain::value::ConfigValue;
use crate::ports::source::ConfigSource;
#[cfg(feature = "watch")]
use crate::ports::source::ChangeEvent;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
#[cfg(feature = "watch")]
use std::sync::{mpsc, Mutex};
#[cfg(feature = "watch")]
use std::time::Duration;
use tracing::{debug, warn};

/// A source reading a dotenv file.
///
/// # Examples
///
/// ```no_run
/// use varlord::adapters::dotenv::DotEnvSource;
/// use varlord::ports::source::ConfigSource;
///
/// let source = DotEnvSource::new(".env");
/// let values = source.load().unwrap();
/// ```
pub struct DotEnvSource {
    path: PathBuf,
    required: bool,
    #[cfg(feature = "watch")]
    stops: Mutex<Vec<mpsc::Sender<()>>>,
}

impl DotEnvSource {
    /// Creates a source for `path`. A missing file yields an empty map
    /// unless [`DotEnvSource::required`] is set.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            required: false,
            #[cfg(feature = "watch")]
            stops: Mutex::new(Vec::new()),
        }
    }

    /// Makes a missing file a load error instead of an empty result.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The file this source reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !self.required => {
                debug!(path = %self.path.display(), "dotenv file absent, yielding nothing");
                return Ok(BTreeMap::new());
            }
            Err(err) => {
                return Err(ConfigError::SourceLoad {
                    source_name: self.name().to_string(),
                    message: format!("cannot read {}", self.path.display()),
                    source: Some(Box::new(err)),
                });
            }
        };
        Ok(parse_dotenv(&contents))
    }
}

impl ConfigSource for DotEnvSource {
    fn id(&self) -> &str {
        "dotenv"
    }

    fn name(&self) -> &str {
        "dotenv file"
    }

    fn load(&self) -> Result<BTreeMap<ConfigKey, ConfigValue>> {
        self.parse()
    }

    #[cfg(feature = "watch")]
    fn supports_watch(&self) -> bool {
        true
    }

    /// Watches the file's directory and emits per-key diffs on change.
    ///
    /// The watch ends when the event receiver is dropped or the source
    /// itself is dropped.
    #[cfg(feature = "watch")]
    fn watch(&self) -> Result<mpsc::Receiver<ChangeEvent>> {
        use notify::{RecursiveMode, Watcher};

        let directory = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let path = self.path.clone();
        let mut last = self.parse()?;

        let (event_tx, event_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = mpsc::channel();
        self.stops
            .lock()
            .expect("stop registry lock poisoned")
            .push(stop_tx);

        let (notify_tx, notify_rx) = mpsc::channel();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                let _ = notify_tx.send(result);
            })
            .map_err(|err| ConfigError::Watch {
                message: "cannot create file watcher".to_string(),
                source: Some(Box::new(err)),
            })?;
        // Watch the directory: editors and deploy tools replace the file
        // rather than writing it in place.
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|err| ConfigError::Watch {
                message: format!("cannot watch {}", directory.display()),
                source: Some(Box::new(err)),
            })?;

        std::thread::spawn(move || {
            // Keep the watcher alive for the lifetime of the thread.
            let _watcher = watcher;
            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }
                let event = match notify_rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(Ok(event)) => event,
                    Ok(Err(err)) => {
                        warn!(error = %err, "file watcher reported an error");
                        continue;
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(mpsc::RecvTimeoutError::Disconnected) => break,
                };
                let ours = event.paths.iter().any(|p| {
                    p == &path || (file_name.is_some() && p.file_name() == file_name.as_deref())
                });
                if !ours {
                    continue;
                }
                let current = match std::fs::read_to_string(&path) {
                    Ok(contents) => parse_dotenv(&contents),
                    Err(_) => BTreeMap::new(),
                };
                let mut closed = false;
                for change in diff_states(&last, &current) {
                    if event_tx.send(change).is_err() {
                        closed = true;
                        break;
                    }
                }
                last = current;
                if closed {
                    break;
                }
            }
            debug!(path = %path.display(), "dotenv watch stopped");
        });

        Ok(event_rx)
    }
}

#[cfg(feature = "watch")]
impl Drop for DotEnvSource {
    fn drop(&mut self) {
        if let Ok(stops) = self.stops.lock() {
            for stop in stops.iter() {
                let _ = stop.send(());
            }
        }
    }
}

/// Computes per-key change events between two parsed states.
#[cfg(feature = "watch")]
fn diff_states(
    old: &BTreeMap<ConfigKey, ConfigValue>,
    new: &BTreeMap<ConfigKey, ConfigValue>,
) -> Vec<ChangeEvent> {
    let mut changes = Vec::new();
    for (key, value) in new {
        match old.get(key) {
            Some(previous) if previous == value => {}
            previous => changes.push(ChangeEvent::put(
                key.clone(),
                previous.cloned(),
                value.clone(),
            )),
        }
    }
    for (key, value) in old {
        if !new.contains_key(key) {
            changes.push(ChangeEvent::delete(key.clone(), value.clone()));
        }
    }
    changes
}

fn parse_dotenv(contents: &str) -> BTreeMap<ConfigKey, ConfigValue> {
    let mut out = BTreeMap::new();
    for (number, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        let Some((name, raw_value)) = line.split_once('=') else {
            warn!(line = number + 1, "skipping malformed dotenv line");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            warn!(line = number + 1, "skipping dotenv line with empty name");
            continue;
        }
        out.insert(
            normalize_key(name),
            ConfigValue::Str(parse_value(raw_value.trim())),
        );
    }
    out
}

fn parse_value(raw: &str) -> String {
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        if (bytes[0] == b'"' && bytes[raw.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[raw.len() - 1] == b'\'')
        {
            return raw[1..raw.len() - 1].to_string();
        }
    }
    // Unquoted values may carry a trailing comment.
    match raw.split_once(" #") {
        Some((value, _)) => value.trim_end().to_string(),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_env(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_basic_lines() {
        let parsed = parse_dotenv("DB__HOST=localhost\nDB__PORT=5432\n");
        assert_eq!(
            parsed.get(&ConfigKey::from("db.host")),
            Some(&ConfigValue::from("localhost"))
        );
        assert_eq!(
            parsed.get(&ConfigKey::from("db.port")),
            Some(&ConfigValue::from("5432"))
        );
    }

    #[test]
    fn test_parse_comments_blanks_and_export() {
        let parsed = parse_dotenv("# comment\n\nexport API_KEY=secret\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(
            parsed.get(&ConfigKey::from("api_key")),
            Some(&ConfigValue::from("secret"))
        );
    }

    #[test]
    fn test_parse_quoted_values() {
        let parsed = parse_dotenv("A=\"hello world\"\nB='single # not comment'\nC=plain # note\n");
        assert_eq!(
            parsed.get(&ConfigKey::from("a")),
            Some(&ConfigValue::from("hello world"))
        );
        assert_eq!(
            parsed.get(&ConfigKey::from("b")),
            Some(&ConfigValue::from("single # not comment"))
        );
        assert_eq!(
            parsed.get(&ConfigKey::from("c")),
            Some(&ConfigValue::from("plain"))
        );
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let parsed = parse_dotenv("JUSTAWORD\n=novalue\nOK=1\n");
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key(&ConfigKey::from("ok")));
    }

    #[test]
    fn test_missing_file_yields_empty_by_default() {
        let source = DotEnvSource::new("/nonexistent/definitely/.env");
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_errors_when_required() {
        let source = DotEnvSource::new("/nonexistent/definitely/.env").required();
        assert!(matches!(
            source.load(),
            Err(ConfigError::SourceLoad { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let file = write_env("DB__HOST=filehost\n");
        let source = DotEnvSource::new(file.path());
        let values = source.load().unwrap();
        assert_eq!(
            values.get(&ConfigKey::from("db.host")),
            Some(&ConfigValue::from("filehost"))
        );
    }

    #[cfg(feature = "watch")]
    #[test]
    fn test_diff_states_put_and_delete() {
        use crate::ports::source::ChangeKind;

        let old = parse_dotenv("A=1\nB=2\n");
        let new = parse_dotenv("A=1\nB=3\nC=4\n");
        let changes = diff_states(&old, &new);
        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|c| c.kind() == ChangeKind::Put));

        let removed = diff_states(&new, &old);
        assert!(removed
            .iter()
            .any(|c| c.kind() == ChangeKind::Delete && c.key == ConfigKey::from("c")));
    }

    #[cfg(feature = "watch")]
    #[test]
    fn test_watch_reports_file_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "A=1\n").unwrap();

        let source = DotEnvSource::new(&path);
        let events = source.watch().unwrap();

        std::fs::write(&path, "A=2\n").unwrap();

        let change = events
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("expected a change event");
        assert_eq!(change.key, ConfigKey::from("a"));
        assert_eq!(change.new_value, Some(ConfigValue::from("2")));
    }
}
