//! Error types for tempo-core operations.
//!
//! Nothing in this crate propagates an error up into the host editor's UI
//! layer: callers either retry on the next scheduler tick or surface a
//! one-time prompt through the editor sink. `TempoError` exists so the
//! internal plumbing can still say precisely what went wrong in logs.

use std::path::PathBuf;

/// All errors that can occur in tempo-core operations.
#[derive(Debug, thiserror::Error)]
pub enum TempoError {
    // ─────────────────────────────────────────────────────────────────────
    // Environment / configuration
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory could not be determined")]
    HomeDirNotFound,

    #[error("State file malformed: {path}: {details}")]
    StateMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Durable store
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TempoError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TempoError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        TempoError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using TempoError.
pub type Result<T> = std::result::Result<T, TempoError>;
