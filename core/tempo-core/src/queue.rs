//! Durable offline queue for session payloads that failed delivery.
//!
//! Backs `~/.tempo/offline-queue.json`. Entries are append-ordered and keyed
//! by a stable identity; an upsert replaces the payload in place so drain
//! order stays append-ordered. Every listing re-reads the file; another
//! window may have drained or appended since we last looked.
//!
//! Growth is bounded: past the entry cap or the age limit, the oldest
//! entries are evicted with a warning. Losing old telemetry is preferred to
//! unbounded growth or failing the write.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Result, TempoError};

const QUEUE_VERSION: u32 = 1;

pub const DEFAULT_MAX_ENTRIES: usize = 256;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// One spooled payload: an immutable serialized aggregate snapshot plus the
/// identity used for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub created_at: String,
    pub payload: Value,
}

impl QueueEntry {
    pub fn new(id: String, created_at: DateTime<Utc>, payload: Value) -> Self {
        Self {
            id,
            created_at: created_at.to_rfc3339(),
            payload,
        }
    }

    fn created_at_parsed(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    entries: Vec<QueueEntry>,
}

impl Default for QueueFile {
    fn default() -> Self {
        QueueFile {
            version: QUEUE_VERSION,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OfflineQueue {
    path: PathBuf,
    max_entries: usize,
    max_age_days: i64,
}

impl OfflineQueue {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
        }
    }

    pub fn with_caps(path: PathBuf, max_entries: usize, max_age_days: i64) -> Self {
        Self {
            path,
            max_entries,
            max_age_days,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Upserts an entry by identity. A replaced entry keeps its original
    /// queue position so deliveries are never reordered.
    pub fn append(&self, entry: QueueEntry, now: DateTime<Utc>) -> Result<()> {
        let mut file = self.load();

        match file.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => file.entries.push(entry),
        }

        self.evict_over_limits(&mut file, now);
        self.save(&file)
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        let mut file = self.load();
        let before = file.entries.len();
        file.entries.retain(|e| e.id != id);
        if file.entries.len() != before {
            self.save(&file)?;
        }
        Ok(())
    }

    /// Current entries, oldest first. Re-reads durable state on every call;
    /// nothing is cached between drains.
    pub fn list_oldest_first(&self) -> Vec<QueueEntry> {
        self.load().entries
    }

    pub fn len(&self) -> usize {
        self.load().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_over_limits(&self, file: &mut QueueFile, now: DateTime<Utc>) {
        let max_age = chrono::Duration::days(self.max_age_days);
        let before = file.entries.len();
        file.entries.retain(|entry| {
            entry
                .created_at_parsed()
                .map(|created| now - created <= max_age)
                .unwrap_or(false)
        });
        let expired = before - file.entries.len();
        if expired > 0 {
            warn!(count = expired, "Evicted expired offline queue entries");
        }

        if file.entries.len() > self.max_entries {
            let overflow = file.entries.len() - self.max_entries;
            file.entries.drain(0..overflow);
            warn!(
                count = overflow,
                cap = self.max_entries,
                "Offline queue over capacity, dropped oldest entries"
            );
        }
    }

    fn load(&self) -> QueueFile {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return QueueFile::default();
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "Failed to read offline queue");
                return QueueFile::default();
            }
        };

        if content.trim().is_empty() {
            return QueueFile::default();
        }

        match serde_json::from_str::<QueueFile>(&content) {
            Ok(file) if file.version == QUEUE_VERSION => file,
            Ok(file) => {
                warn!(
                    version = file.version,
                    expected = QUEUE_VERSION,
                    "Unsupported offline queue version, starting empty"
                );
                QueueFile::default()
            }
            Err(err) => {
                warn!(error = %err, path = %self.path.display(), "Corrupt offline queue, starting empty");
                QueueFile::default()
            }
        }
    }

    fn save(&self, file: &QueueFile) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| TempoError::StateMalformed {
                path: self.path.clone(),
                details: "queue path has no parent directory".to_string(),
            })?;
        fs::create_dir_all(parent).map_err(|e| TempoError::io("create queue dir", e))?;

        let content = serde_json::to_string_pretty(file)
            .map_err(|e| TempoError::json("serialize offline queue", e))?;

        let mut temp_file =
            NamedTempFile::new_in(parent).map_err(|e| TempoError::io("create queue temp file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| TempoError::io("write queue temp file", e))?;
        temp_file
            .flush()
            .map_err(|e| TempoError::io("flush queue temp file", e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| TempoError::io("commit offline queue", e.error))?;

        Ok(())
    }
}
