//! Durable key/value store for scalar state.
//!
//! Backs `~/.tempo/session.json`: auth token, account name, server-sourced
//! preferences, and the flow flag. Several editor windows read and write
//! this file concurrently, so every read goes back to disk and every write
//! is an atomic temp-file + rename of the whole document.
//!
//! # Defensive Design
//!
//! Another window may be mid-write when we read, so we handle:
//! - Missing files (empty store)
//! - Empty files (empty store)
//! - Corrupt JSON (empty store, log warning)
//! - Version mismatches (empty store, log warning)
//!
//! Losing a stale read is acceptable; blocking the editor is not.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, TempoError};

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    items: BTreeMap<String, Value>,
}

impl Default for StoreFile {
    fn default() -> Self {
        StoreFile {
            version: STORE_VERSION,
            items: BTreeMap::new(),
        }
    }
}

/// File-backed key/value store. Cheap to construct; holds no cached state
/// beyond the path, so concurrent windows always observe each other's
/// latest committed write.
#[derive(Debug, Clone)]
pub struct KvStore {
    path: PathBuf,
}

impl KvStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True once the backing file exists on disk.
    pub fn file_exists(&self) -> bool {
        self.path.exists()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read_items().items.remove(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// Writes one key. Read-modify-write of the whole document; last writer
    /// wins, which the callers tolerate by keeping values idempotent.
    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut store = self.read_items();
        store.items.insert(key.to_string(), value);
        self.save(&store)
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let mut store = self.read_items();
        if store.items.remove(key).is_some() {
            self.save(&store)?;
        }
        Ok(())
    }

    fn read_items(&self) -> StoreFile {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return StoreFile::default();
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "Failed to read kv store");
                return StoreFile::default();
            }
        };

        if content.trim().is_empty() {
            return StoreFile::default();
        }

        match serde_json::from_str::<StoreFile>(&content) {
            Ok(store) if store.version == STORE_VERSION => store,
            Ok(store) => {
                warn!(
                    version = store.version,
                    expected = STORE_VERSION,
                    "Unsupported kv store version, starting empty"
                );
                StoreFile::default()
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "Corrupt kv store, starting empty");
                StoreFile::default()
            }
        }
    }

    fn save(&self, store: &StoreFile) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| TempoError::StateMalformed {
                path: self.path.clone(),
                details: "kv store path has no parent directory".to_string(),
            })?;
        fs::create_dir_all(parent).map_err(|e| TempoError::io("create kv store dir", e))?;

        let content = serde_json::to_string_pretty(store)
            .map_err(|e| TempoError::json("serialize kv store", e))?;

        let mut temp_file =
            NamedTempFile::new_in(parent).map_err(|e| TempoError::io("create kv temp file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| TempoError::io("write kv temp file", e))?;
        temp_file
            .flush()
            .map_err(|e| TempoError::io("flush kv temp file", e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| TempoError::io("commit kv store", e.error))?;

        Ok(())
    }
}
