//! Durable key-value state
//!
//! Session state lives behind [`StateStore`] rather than in the bridge
//! itself, so the core can be rebuilt in place without losing the mapping
//! of live connections to slots. Values are opaque JSON (maps, lists,
//! scalars) addressed by fixed key names.

use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::slot_pool::Slot;

/// Fixed key names.
pub mod keys {
    use crate::slot_pool::Slot;

    /// Map of connection identity to slot.
    pub const SLOT_BY_CONN: &str = "wob_slot_by_conn";
    /// Ascending list of free slots.
    pub const FREE_SLOTS: &str = "wob_free_slots";
    /// Public discovery URL.
    pub const URL: &str = "wob_url";

    pub fn touch_count(slot: Slot) -> String {
        format!("wob_touch_count_{}", slot)
    }

    pub fn trigger(slot: Slot) -> String {
        format!("wob_trig_{}", slot)
    }

    pub fn signaling_conn(slot: Slot) -> String {
        format!("wob_webrtc_conn_{}", slot)
    }

    /// Per-frame device state. Reset on every connect, so it never needs
    /// to reach disk.
    pub fn is_transient(key: &str) -> bool {
        key.starts_with("wob_touch_count_") || key.starts_with("wob_trig_")
    }
}

/// Process-wide key-value store with `get(key)`/`set(key, value)` semantics.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
    /// Write several keys as one unit: either all land or none do.
    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl dyn StateStore {
    /// Read and decode a value. Undecodable values are treated as absent.
    pub fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, "Ignoring undecodable stored value: {}", e);
                None
            }
        }
    }

    pub fn fetch_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.fetch(key).unwrap_or(default)
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| SessionError::Store(e.to_string()))?;
        self.set(key, value)
    }

    /// Identity → slot map.
    pub fn slot_map(&self) -> BTreeMap<String, Slot> {
        self.fetch_or(keys::SLOT_BY_CONN, BTreeMap::new())
    }
}

/// In-memory store, shared by everything holding the same `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }

    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<()> {
        let mut values = self.values.write();
        for (key, value) in entries {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Store mirrored to a JSON file.
///
/// Reads are served from memory. Every durable write rewrites the file
/// through a temporary sibling and a rename, so a crash leaves either the
/// old or the new contents on disk. A write that cannot reach disk is
/// undone in memory too. Transient keys (see [`keys::is_transient`]) stay
/// in memory and are never written out.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open the store, loading existing contents if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
                Ok(values) => values,
                Err(e) => {
                    warn!(path = %path.display(), "Discarding corrupt state file: {}", e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(SessionError::Store(format!("{}: {}", path.display(), e))),
        };
        debug!(path = %path.display(), entries = values.len(), "Opened state file");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let bytes =
            serde_json::to_vec_pretty(values).map_err(|e| SessionError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| SessionError::Store(format!("{}: {}", self.path.display(), e)))
    }

    /// Apply `entries` and persist, restoring the previous values if the
    /// file cannot be written.
    fn apply(&self, entries: Vec<(&str, Option<Value>)>) -> Result<()> {
        let mut values = self.values.write();
        let mut durable = false;
        let mut previous = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            durable |= !keys::is_transient(key);
            let old = match value {
                Some(value) => values.insert(key.to_string(), value),
                None => values.remove(key),
            };
            previous.push((key, old));
        }
        if !durable {
            return Ok(());
        }

        self.persist(&values).inspect_err(|e| {
            warn!(path = %self.path.display(), "Rolling back unpersisted write: {}", e);
            for (key, old) in previous.into_iter().rev() {
                match old {
                    Some(old) => values.insert(key.to_string(), old),
                    None => values.remove(key),
                };
            }
        })
    }
}

impl StateStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.apply(vec![(key, Some(value))])
    }

    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<()> {
        self.apply(entries.into_iter().map(|(k, v)| (k, Some(v))).collect())
    }

    fn remove(&self, key: &str) -> Result<()> {
        if !self.values.read().contains_key(key) {
            return Ok(());
        }
        self.apply(vec![(key, None)])
    }
}
