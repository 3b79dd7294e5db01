//! Namespaced key-value persistence.
//!
//! Settings are grouped in namespaces (`miner`, `sys`, `timecfg`, `wifi`)
//! holding a handful of string, bool or integer keys. Writes are
//! synchronous and fire-and-forget: callers assume they succeed, and
//! backends log failures instead of returning them.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;

use crate::tracing::prelude::*;

/// Errors raised while opening a persistent store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Namespaced settings storage.
///
/// Loads return `default` when the key is missing or holds a value of
/// another type.
pub trait Store: Send + Sync {
    fn load_string(&self, namespace: &str, key: &str, default: &str) -> String;
    fn save_string(&self, namespace: &str, key: &str, value: &str);

    fn load_bool(&self, namespace: &str, key: &str, default: bool) -> bool;
    fn save_bool(&self, namespace: &str, key: &str, value: bool);

    fn load_i32(&self, namespace: &str, key: &str, default: i32) -> i32;
    fn save_i32(&self, namespace: &str, key: &str, value: i32);

    /// Remove every key in `namespace`.
    fn clear(&self, namespace: &str);
}

type Namespaces = BTreeMap<String, BTreeMap<String, Value>>;

fn lookup<'a>(data: &'a Namespaces, namespace: &str, key: &str) -> Option<&'a Value> {
    data.get(namespace)?.get(key)
}

fn insert(data: &mut Namespaces, namespace: &str, key: &str, value: Value) {
    data.entry(namespace.to_string())
        .or_default()
        .insert(key.to_string(), value);
}

/// Volatile store, for tests and for running without a settings file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Namespaces>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn load_string(&self, namespace: &str, key: &str, default: &str) -> String {
        lookup(&self.data.lock(), namespace, key)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    }

    fn save_string(&self, namespace: &str, key: &str, value: &str) {
        insert(&mut self.data.lock(), namespace, key, Value::from(value));
    }

    fn load_bool(&self, namespace: &str, key: &str, default: bool) -> bool {
        lookup(&self.data.lock(), namespace, key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    fn save_bool(&self, namespace: &str, key: &str, value: bool) {
        insert(&mut self.data.lock(), namespace, key, Value::from(value));
    }

    fn load_i32(&self, namespace: &str, key: &str, default: i32) -> i32 {
        lookup(&self.data.lock(), namespace, key)
            .and_then(Value::as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(default)
    }

    fn save_i32(&self, namespace: &str, key: &str, value: i32) {
        insert(&mut self.data.lock(), namespace, key, Value::from(value));
    }

    fn clear(&self, namespace: &str) {
        self.data.lock().remove(namespace);
    }
}

/// Store backed by a JSON file, rewritten after every change.
///
/// The file holds one object per namespace:
///
/// ```json
/// { "miner": { "ip": "192.168.1.50", "mode": "eco" }, "sys": { "forceAP": false } }
/// ```
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data: Namespaces = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file yet");
                Namespaces::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            memory: MemoryStore {
                data: Mutex::new(data),
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) {
        let result = serde_json::to_string_pretty(&*self.memory.data.lock())
            .map_err(StoreError::from)
            .and_then(|text| fs::write(&self.path, text).map_err(StoreError::from));
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "Failed to write settings");
        }
    }
}

impl Store for JsonFileStore {
    fn load_string(&self, namespace: &str, key: &str, default: &str) -> String {
        self.memory.load_string(namespace, key, default)
    }

    fn save_string(&self, namespace: &str, key: &str, value: &str) {
        self.memory.save_string(namespace, key, value);
        self.flush();
    }

    fn load_bool(&self, namespace: &str, key: &str, default: bool) -> bool {
        self.memory.load_bool(namespace, key, default)
    }

    fn save_bool(&self, namespace: &str, key: &str, value: bool) {
        self.memory.save_bool(namespace, key, value);
        self.flush();
    }

    fn load_i32(&self, namespace: &str, key: &str, default: i32) -> i32 {
        self.memory.load_i32(namespace, key, default)
    }

    fn save_i32(&self, namespace: &str, key: &str, value: i32) {
        self.memory.save_i32(namespace, key, value);
        self.flush();
    }

    fn clear(&self, namespace: &str) {
        self.memory.clear(namespace);
        self.flush();
    }
}
