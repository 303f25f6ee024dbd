//! Primary-window election via a shared lease file.
//!
//! N concurrently open windows on one machine must not send N copies of the
//! same heartbeats and drains. The only coordination channel is a record in
//! shared durable storage: the first window to observe no valid lease writes
//! its own identity; the holder renews on every tick; a holder that stops
//! renewing (crash, window close) expires after a timeout and any other
//! window may take over. A holder whose pid is gone is treated as expired
//! immediately rather than waiting out the clock.
//!
//! The claim is a best-effort read-modify-write, not an atomic
//! compare-and-swap: two windows racing between read and write can both
//! believe they are primary for up to one renewal interval. All
//! primary-gated work is idempotent (upserts keyed by payload identity), so
//! the race costs duplicate sends at worst, never lost or corrupted data.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, TempoError};

const LEASE_VERSION: u32 = 1;

/// Lease expires after this long without renewal. Chosen as a small multiple
/// of the expected tick interval to tolerate scheduler jitter and clock skew.
pub const DEFAULT_LEASE_TIMEOUT_SECS: i64 = 180;

/// The shared lease record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseRecord {
    version: u32,
    pub holder_id: String,
    pub pid: u32,
    pub acquired_at: String,
    pub renewed_at: String,
}

pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }
    #[cfg(not(unix))]
    {
        // Without a liveness probe, fall back to timeout-only expiry.
        let _ = pid;
        true
    }
}

pub struct PrimaryWindowCoordinator {
    path: PathBuf,
    window_id: String,
    pid: u32,
    timeout_secs: i64,
}

impl PrimaryWindowCoordinator {
    pub fn new(path: PathBuf, window_id: String, pid: u32) -> Self {
        Self {
            path,
            window_id,
            pid,
            timeout_secs: DEFAULT_LEASE_TIMEOUT_SECS,
        }
    }

    pub fn with_timeout(path: PathBuf, window_id: String, pid: u32, timeout_secs: i64) -> Self {
        Self {
            path,
            window_id,
            pid,
            timeout_secs,
        }
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    /// One election round: renew when holding, claim when the lease is
    /// absent, unreadable, expired, or held by a dead process. Runs once per
    /// scheduler tick.
    pub fn tick(&self, now: DateTime<Utc>) {
        match self.read_lease() {
            Some(lease) if lease.holder_id == self.window_id => {
                if let Err(err) = self.write_lease(Some(&lease), now) {
                    warn!(error = %err, "Failed to renew primary-window lease");
                }
            }
            Some(lease) => {
                if self.lease_expired(&lease, now) {
                    info!(
                        previous = %lease.holder_id,
                        window = %self.window_id,
                        "Taking over expired primary-window lease"
                    );
                    if let Err(err) = self.write_lease(None, now) {
                        warn!(error = %err, "Failed to claim primary-window lease");
                    }
                } else {
                    debug!(holder = %lease.holder_id, "Primary-window lease held elsewhere");
                }
            }
            None => {
                if let Err(err) = self.write_lease(None, now) {
                    warn!(error = %err, "Failed to claim primary-window lease");
                }
            }
        }
    }

    /// Whether this window currently holds a valid lease. Always re-reads
    /// durable state; another window may have taken over since the last tick.
    pub fn is_primary(&self, now: DateTime<Utc>) -> bool {
        match self.read_lease() {
            Some(lease) => lease.holder_id == self.window_id && !self.lease_expired(&lease, now),
            None => false,
        }
    }

    /// Drops the lease on teardown, but only when still the holder; a
    /// takeover must not be clobbered by a closing window.
    pub fn release(&self) {
        if let Some(lease) = self.read_lease() {
            if lease.holder_id == self.window_id {
                if let Err(err) = fs::remove_file(&self.path) {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        warn!(error = %err, "Failed to release primary-window lease");
                    }
                }
            }
        }
    }

    fn lease_expired(&self, lease: &LeaseRecord, now: DateTime<Utc>) -> bool {
        let renewed_at = match DateTime::parse_from_rfc3339(&lease.renewed_at) {
            Ok(dt) => dt.with_timezone(&Utc),
            // Unparseable renewal timestamp: claimable.
            Err(_) => return true,
        };

        if (now - renewed_at).num_seconds() > self.timeout_secs {
            return true;
        }

        !is_pid_alive(lease.pid)
    }

    fn read_lease(&self) -> Option<LeaseRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(error = %err, "Failed to read primary-window lease");
                return None;
            }
        };

        match serde_json::from_str::<LeaseRecord>(&content) {
            Ok(lease) if lease.version == LEASE_VERSION => Some(lease),
            Ok(_) | Err(_) => {
                // Unknown or corrupt record: treated as absent, next tick claims it.
                None
            }
        }
    }

    /// Best-effort compare-and-write. `current` carries the acquisition time
    /// forward on renewal; a fresh claim stamps both timestamps with now.
    fn write_lease(&self, current: Option<&LeaseRecord>, now: DateTime<Utc>) -> Result<()> {
        let record = LeaseRecord {
            version: LEASE_VERSION,
            holder_id: self.window_id.clone(),
            pid: self.pid,
            acquired_at: current
                .map(|lease| lease.acquired_at.clone())
                .unwrap_or_else(|| now.to_rfc3339()),
            renewed_at: now.to_rfc3339(),
        };

        let parent = self
            .path
            .parent()
            .ok_or_else(|| TempoError::StateMalformed {
                path: self.path.clone(),
                details: "lease path has no parent directory".to_string(),
            })?;
        fs::create_dir_all(parent).map_err(|e| TempoError::io("create lease dir", e))?;

        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| TempoError::json("serialize lease", e))?;

        let mut temp_file =
            NamedTempFile::new_in(parent).map_err(|e| TempoError::io("create lease temp file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| TempoError::io("write lease temp file", e))?;
        temp_file
            .flush()
            .map_err(|e| TempoError::io("flush lease temp file", e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| TempoError::io("commit lease", e.error))?;

        Ok(())
    }

    /// Current holder, for status reporting. `None` when absent or unreadable.
    pub fn current_holder(&self) -> Option<LeaseRecord> {
        self.read_lease()
    }
}
