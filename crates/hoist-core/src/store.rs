//! Key/value persistence with optional per-entry expiry.
//!
//! The updater never talks to a concrete backend: caches and installed state
//! are written through [`KeyValueStore`], which the host supplies. Two
//! implementations ship here: [`MemoryStore`] for tests and short-lived hosts,
//! and [`FileStore`], a JSON file replaced atomically on every write.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpdateError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to force cache expiry.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub trait KeyValueStore: Send + Sync {
    /// Value under `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value`; `ttl = None` keeps it until deleted.
    ///
    /// # Errors
    /// Returns an error when the backend cannot persist the entry.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), UpdateError>;

    /// # Errors
    /// Returns an error when the backend cannot persist the removal.
    fn delete(&self, key: &str) -> Result<(), UpdateError>;
}

/// Typed read. Entries that no longer match `T` are treated as absent.
pub fn load<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            warn!("Ignoring unreadable store entry {key}: {error}");
            None
        }
    }
}

/// Typed write.
///
/// # Errors
/// Returns an error when `value` cannot be serialized or the store rejects it.
pub fn save<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), UpdateError> {
    let value = serde_json::to_value(value)
        .map_err(|error| UpdateError::store("failed to encode store entry", error))?;
    store.set(key, value, ttl)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    value: Value,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expires_at = ttl.and_then(|ttl| {
            TimeDelta::from_std(ttl)
                .ok()
                .and_then(|delta| now.checked_add_signed(delta))
        });
        Self { value, expires_at }
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), UpdateError> {
        let entry = Entry::new(value, ttl, self.clock.now());
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), UpdateError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// JSON file of entries. Every mutation rewrites the file through a temp file
/// and a rename so a crash never leaves a torn file behind.
pub struct FileStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
            guard: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> HashMap<String, Entry> {
        let Ok(data) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        serde_json::from_str(&data).unwrap_or_else(|error| {
            warn!("Discarding unreadable store {}: {error}", self.path.display());
            HashMap::new()
        })
    }

    /// Replace the file in one rename so readers never see a partial store.
    fn write_entries(&self, entries: &HashMap<String, Entry>) -> Result<(), UpdateError> {
        let data = serde_json::to_vec_pretty(entries)
            .map_err(|error| UpdateError::store("failed to encode store", error))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)
            .map_err(|error| UpdateError::store("failed to create store directory", error))?;

        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .map_err(|error| UpdateError::store("failed to stage store", error))?;
        staged
            .write_all(&data)
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|error| UpdateError::store("failed to stage store", error))?;
        staged
            .persist(&self.path)
            .map_err(|error| UpdateError::store("failed to write store", error.error))?;
        Ok(())
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut HashMap<String, Entry>, DateTime<Utc>),
    ) -> Result<(), UpdateError> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let mut entries = self.read_entries();
        entries.retain(|_, entry| entry.is_live(now));
        apply(&mut entries, now);
        self.write_entries(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let _lock = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        self.read_entries()
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value)
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), UpdateError> {
        self.mutate(|entries, now| {
            entries.insert(key.to_string(), Entry::new(value, ttl, now));
        })
    }

    fn delete(&self, key: &str) -> Result<(), UpdateError> {
        self.mutate(|entries, _| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{FileStore, KeyValueStore, ManualClock, MemoryStore, load, save};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .expect("valid start time"),
        ))
    }

    #[test]
    fn memory_entries_expire_after_ttl() {
        let clock = clock();
        let store = MemoryStore::with_clock(clock.clone());
        store
            .set("k", json!("v"), Some(Duration::from_secs(60)))
            .expect("set should succeed");

        clock.advance(Duration::from_secs(59));
        assert_eq!(store.get("k"), Some(json!("v")));

        clock.advance(Duration::from_secs(1));
        assert_eq!(store.get("k"), None);
    }

    #[test]
    fn entries_without_ttl_never_expire() {
        let clock = clock();
        let store = MemoryStore::with_clock(clock.clone());
        store.set("k", json!(1), None).expect("set should succeed");

        clock.advance(Duration::from_secs(365 * 24 * 3600));
        assert!(store.contains("k"));

        store.delete("k").expect("delete should succeed");
        assert!(!store.contains("k"));
    }

    #[test]
    fn typed_helpers_ignore_mismatched_values() {
        let store = MemoryStore::new();
        save(&store, "n", &42_u32, None).expect("save should succeed");
        assert_eq!(load::<u32>(&store, "n"), Some(42));
        assert_eq!(load::<Vec<String>>(&store, "n"), None);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("nested").join("options.json");

        FileStore::new(&path)
            .set("build", json!("20240305101530"), None)
            .expect("set should succeed");

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("build"), Some(json!("20240305101530")));

        let names: Vec<_> = std::fs::read_dir(path.parent().expect("store has a parent"))
            .expect("read store dir")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("options.json")]);
    }

    #[test]
    fn file_store_drops_expired_entries_on_write() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("transients.json");
        let clock = clock();
        let store = FileStore::with_clock(&path, clock.clone());

        store
            .set("short", json!(true), Some(Duration::from_secs(300)))
            .expect("set should succeed");
        clock.advance(Duration::from_secs(301));
        store
            .set("other", json!(false), None)
            .expect("set should succeed");

        let raw = std::fs::read_to_string(&path).expect("store file should exist");
        assert!(!raw.contains("short"));
        assert_eq!(store.get("other"), Some(json!(false)));
    }

    #[test]
    fn file_store_recovers_from_corrupt_file() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("options.json");
        std::fs::write(&path, "{not-valid-json").expect("corrupt file should be written");

        let store = FileStore::new(&path);
        assert_eq!(store.get("anything"), None);
        store.set("k", json!(1), None).expect("set should succeed");
        assert_eq!(store.get("k"), Some(json!(1)));
    }
}
