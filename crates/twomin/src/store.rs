//! Persisted key-value state
//!
//! Lifetime counters, the session log and the timer anchor live side by side
//! in one small JSON object:
//! - File store: ~/.local/share/twomin/state.json
//! - Memory store: tests and throwaway runs
//!
//! Readers never fail on bad data. A value that does not deserialize is
//! replaced with its default and a warning is logged.

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Key-value storage that survives restarts
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Read-modify-write of the whole object as one step
    ///
    /// `apply` sees the latest stored entries, including writes made by
    /// other processes sharing the store. An error from `apply` leaves the
    /// store untouched.
    fn update(
        &self,
        apply: &mut dyn FnMut(&mut Map<String, Value>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.set_many(vec![(key, value)])
    }

    /// Write several keys at once, leaving every other key as stored
    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        let mut entries = Some(entries);
        self.update(&mut |stored| {
            for (key, value) in entries.take().unwrap_or_default() {
                stored.insert(key.to_string(), value);
            }
            Ok(())
        })
    }
}

/// Read a typed value, falling back to `T::default()` when missing or corrupt
pub fn load_or_default<T>(store: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match store.get(key) {
        Ok(value) => parse_or_default(value, key),
        Err(e) => {
            warn!(key, error = %e, "failed to read persisted value, using default");
            T::default()
        }
    }
}

/// Typed view of `entries[key]`, with the same fallback as [`load_or_default`]
pub fn entry_or_default<T>(entries: &Map<String, Value>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    parse_or_default(entries.get(key).cloned(), key)
}

fn parse_or_default<T>(value: Option<Value>, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(value) = value else {
        return T::default();
    };

    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(key, error = %e, "discarding unreadable persisted value");
            T::default()
        }
    }
}

/// Serialize `value` into a JSON value for [`KeyValueStore::set`]
pub fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut Map<String, Value>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = entries.clone();
        apply(&mut next)?;
        *entries = next;
        Ok(())
    }
}

/// JSON file store shared by every twomin process
///
/// Reads go to disk each time. Writes hold an exclusive lock on
/// `state.json.lock`, re-read the file, apply the change and replace the file
/// through a temp file and an atomic rename.
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) the store at `path`
    ///
    /// An unreadable file is moved aside to `state.json.corrupt`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_path_buf(),
            lock_path: path.with_extension("json.lock"),
        };

        let _lock = store.lock()?;
        let entries = store.read_or_recover()?;
        debug!(path = %path.display(), keys = entries.len(), "opened state file");

        Ok(store)
    }

    fn lock(&self) -> Result<File, StoreError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn read(&self) -> Result<Map<String, Value>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Caller holds the lock
    fn read_or_recover(&self) -> Result<Map<String, Value>, StoreError> {
        match self.read() {
            Ok(entries) => Ok(entries),
            Err(StoreError::Io(e)) => Err(StoreError::Io(e)),
            Err(e) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "state file unreadable, starting fresh"
                );
                fs::rename(&self.path, &backup)?;
                Ok(Map::new())
            }
        }
    }

    fn parse(content: &str) -> Result<Map<String, Value>, StoreError> {
        if content.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(content)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::NotAnObject(other.to_string())),
        }
    }

    fn flush(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(entries)?;

        let mut file = File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut Map<String, Value>) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        let current = self.read_or_recover()?;

        let mut next = current.clone();
        apply(&mut next)?;
        if next != current {
            self.flush(&next)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::env;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(test_name: &str) -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = env::temp_dir().join(format!(
            "twomin_store_test_{}_{}_{}",
            std::process::id(),
            test_name,
            counter
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_memory_store_set_get() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", json!(1)).unwrap();
        store.set_many(vec![("a", json!(2)), ("b", json!(3))]).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(json!(2)));
        assert_eq!(store.get("b").unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_failed_update_changes_nothing() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).unwrap();

        let result = store.update(&mut |entries| {
            entries.insert("a".to_string(), json!(99));
            Err(StoreError::NotAnObject("nope".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.get("a").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = temp_dir("reopen");
        let path = dir.join("state.json");

        {
            let store = JsonFileStore::open(&path).unwrap();
            store
                .set_many(vec![("lifetimeTaskCount", json!(3)), ("x", json!("y"))])
                .unwrap();
        }

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("lifetimeTaskCount").unwrap(), Some(json!(3)));
        assert_eq!(store.get("x").unwrap(), Some(json!("y")));
        assert!(!path.with_extension("json.tmp").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_two_stores_on_one_file_keep_each_others_keys() {
        let dir = temp_dir("shared");
        let path = dir.join("state.json");

        let foreground = JsonFileStore::open(&path).unwrap();
        let one_shot = JsonFileStore::open(&path).unwrap();

        foreground.set("timer", json!({"phase": "countingDown"})).unwrap();
        one_shot.set("lifetimeTaskCount", json!(1)).unwrap();
        foreground.set("timer", json!({"phase": "idle"})).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("lifetimeTaskCount").unwrap(), Some(json!(1)));
        assert_eq!(reopened.get("timer").unwrap(), Some(json!({"phase": "idle"})));
        assert_eq!(foreground.get("lifetimeTaskCount").unwrap(), Some(json!(1)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_update_sees_other_writers() {
        let dir = temp_dir("counter");
        let path = dir.join("state.json");
        let a = JsonFileStore::open(&path).unwrap();
        let b = JsonFileStore::open(&path).unwrap();

        for store in [&a, &b, &a, &b] {
            store
                .update(&mut |entries| {
                    let count: u64 = entry_or_default(entries, "count");
                    entries.insert("count".to_string(), json!(count + 1));
                    Ok(())
                })
                .unwrap();
        }

        assert_eq!(a.get("count").unwrap(), Some(json!(4)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_corrupt_file_starts_fresh_and_keeps_backup() {
        let dir = temp_dir("corrupt");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("lifetimeTaskCount").unwrap().is_none());
        assert!(path.with_extension("json.corrupt").exists());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_non_object_file_starts_fresh() {
        let dir = temp_dir("non_object");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("state.json");
        fs::write(&path, "42").unwrap();

        let store = JsonFileStore::open(&path).unwrap();
        assert!(store.get("anything").unwrap().is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_or_default_falls_back_on_bad_value() {
        let store = MemoryStore::new();
        store.set("count", json!("not a number")).unwrap();

        let count: u64 = load_or_default(&store, "count");
        assert_eq!(count, 0);

        let missing: Vec<u32> = load_or_default(&store, "missing");
        assert!(missing.is_empty());
    }
}
