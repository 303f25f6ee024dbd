//! Storage configuration and path management for Tempo.
//!
//! All durable state shared between concurrently open editor windows lives
//! under one root directory (default `~/.tempo/`). Centralizing the paths
//! here keeps the cross-process contract auditable and lets tests inject a
//! temp directory instead of touching the real home.

use std::path::{Path, PathBuf};

use crate::error::{Result, TempoError};

/// Central configuration for all Tempo storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.tempo/`.
/// Tests use `StorageConfig::with_root(temp_dir)` for isolation.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = dirs::home_dir().expect("Could not find home directory");
        Self {
            root: home.join(".tempo"),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    /// Used for testing with temp directories.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    /// Fallible variant of `default()` for hosts that must not panic.
    pub fn from_home() -> Result<Self> {
        let home = dirs::home_dir().ok_or(TempoError::HomeDirNotFound)?;
        Ok(Self {
            root: home.join(".tempo"),
        })
    }

    /// Returns the root directory for Tempo data.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to session.json (key/value scalars: auth token, account name,
    /// preferences, flow flag). Readable by every window on the machine.
    pub fn session_file(&self) -> PathBuf {
        self.root.join("session.json")
    }

    /// Path to offline-queue.json (session payloads awaiting delivery).
    pub fn offline_queue_file(&self) -> PathBuf {
        self.root.join("offline-queue.json")
    }

    /// Path to primary-window.json (the primary-window lease record).
    pub fn lease_file(&self) -> PathBuf {
        self.root.join("primary-window.json")
    }

    /// Path to logs/ (rolling host-process logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Ensures the root directory and standard subdirectories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_with_root_sets_custom_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/test-tempo"));
        assert_eq!(config.root(), Path::new("/tmp/test-tempo"));
    }

    #[test]
    fn test_session_file_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/tempo"));
        assert_eq!(
            config.session_file(),
            PathBuf::from("/tmp/tempo/session.json")
        );
    }

    #[test]
    fn test_offline_queue_file_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/tempo"));
        assert_eq!(
            config.offline_queue_file(),
            PathBuf::from("/tmp/tempo/offline-queue.json")
        );
    }

    #[test]
    fn test_lease_file_path() {
        let config = StorageConfig::with_root(PathBuf::from("/tmp/tempo"));
        assert_eq!(
            config.lease_file(),
            PathBuf::from("/tmp/tempo/primary-window.json")
        );
    }

    #[test]
    fn test_ensure_dirs_creates_structure() {
        let temp = TempDir::new().unwrap();
        let config = StorageConfig::with_root(temp.path().join("state"));

        config.ensure_dirs().unwrap();

        assert!(config.root().exists());
        assert!(config.logs_dir().exists());
    }
}
