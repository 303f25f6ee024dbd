//! Event and wire types shared between the Tempo engine and its hosts.
//!
//! This crate is shared by the engine and the editor-side event producers to
//! prevent schema drift. The engine remains the authority on validation, but
//! hosts can reuse the same types to construct valid events.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version of the session summary payload schema posted to the collector.
/// Bump when `SessionAggregate` gains, loses, or renames wire fields.
pub const SCHEMA_VERSION: u32 = 1;

/// Events the editor boundary can feed into the engine.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EventKind {
    FileOpened,
    FileClosed,
    Keystroke,
    FocusGained,
    FocusLost,
    IdleDetected,
    CollabStarted,
    CollabEnded,
    Shutdown,
}

/// One raw editor activity event.
///
/// Field presence requirements depend on `kind`; see [`EditorEvent::validate`].
/// Keystroke deltas default to zero so hosts only fill what they observed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EditorEvent {
    pub event_id: String,
    pub recorded_at: String,
    pub kind: EventKind,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub characters_added: u64,
    #[serde(default)]
    pub characters_removed: u64,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_removed: u64,
    #[serde(default)]
    pub collab_session_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEvent {
    pub code: String,
    pub message: String,
}

impl InvalidEvent {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InvalidEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl EditorEvent {
    pub fn validate(&self) -> Result<(), InvalidEvent> {
        if self.event_id.trim().is_empty() {
            return Err(InvalidEvent::new("invalid_event_id", "event_id is required"));
        }
        if self.event_id.len() > 128 {
            return Err(InvalidEvent::new(
                "invalid_event_id",
                "event_id must be 128 characters or fewer",
            ));
        }

        if DateTime::parse_from_rfc3339(&self.recorded_at).is_err() {
            return Err(InvalidEvent::new(
                "invalid_timestamp",
                "recorded_at must be RFC3339",
            ));
        }

        match self.kind {
            EventKind::FileOpened | EventKind::FileClosed | EventKind::Keystroke => {
                require_string(&self.file_path, "file_path")?;
            }
            EventKind::CollabStarted | EventKind::CollabEnded => {
                require_string(&self.collab_session_id, "collab_session_id")?;
            }
            EventKind::FocusGained
            | EventKind::FocusLost
            | EventKind::IdleDetected
            | EventKind::Shutdown => {}
        }

        Ok(())
    }
}

/// Decodes and validates an event from an untyped JSON value.
pub fn parse_event(params: Value) -> Result<EditorEvent, InvalidEvent> {
    let event: EditorEvent = serde_json::from_value(params).map_err(|err| {
        InvalidEvent::new(
            "invalid_params",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    event.validate()?;
    Ok(event)
}

fn require_string(value: &Option<String>, field: &str) -> Result<(), InvalidEvent> {
    if let Some(candidate) = value {
        if !candidate.trim().is_empty() {
            return Ok(());
        }
    }
    Err(InvalidEvent::new(
        "missing_field",
        format!("{} is required", field),
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Collector API shapes
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP-verb shape of a collector call. The transport implementation itself
/// lives outside this workspace; everything here goes through one uniform
/// request/response pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// Uniform collector response: 2xx ⇒ `ok`, anything else (including a
/// transport-level failure or timeout) ⇒ not ok with no payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiResponse {
    pub fn ok(status: u16, data: Value) -> Self {
        Self {
            ok: true,
            status,
            data: Some(data),
        }
    }

    /// A failed call. `status` is 0 when the request never reached the server.
    pub fn error(status: u16) -> Self {
        Self {
            ok: false,
            status,
            data: None,
        }
    }
}

/// Heartbeat classification sent to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeartbeatKind {
    Installed,
    Initialized,
    Hourly,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_event(kind: EventKind) -> EditorEvent {
        EditorEvent {
            event_id: "evt-1".to_string(),
            recorded_at: "2026-01-30T12:00:00Z".to_string(),
            kind,
            file_path: Some("/repo/src/main.rs".to_string()),
            characters_added: 0,
            characters_removed: 0,
            lines_added: 0,
            lines_removed: 0,
            collab_session_id: None,
            metadata: None,
        }
    }

    #[test]
    fn validates_file_event() {
        let event = base_event(EventKind::FileOpened);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn rejects_file_event_without_path() {
        let mut event = base_event(EventKind::Keystroke);
        event.file_path = None;
        assert!(event.validate().is_err());
    }

    #[test]
    fn focus_events_do_not_need_a_path() {
        let mut event = base_event(EventKind::FocusLost);
        event.file_path = None;
        assert!(event.validate().is_ok());
    }

    #[test]
    fn collab_events_require_session_id() {
        let mut event = base_event(EventKind::CollabStarted);
        event.collab_session_id = None;
        assert!(event.validate().is_err());

        event.collab_session_id = Some("collab-9".to_string());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut event = base_event(EventKind::Shutdown);
        event.recorded_at = "not-a-time".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn rejects_long_event_id() {
        let mut event = base_event(EventKind::Shutdown);
        event.event_id = "a".repeat(256);
        assert!(event.validate().is_err());
    }

    #[test]
    fn parse_event_round_trips_json() {
        let value = serde_json::json!({
            "event_id": "evt-2",
            "recorded_at": "2026-01-30T12:00:00Z",
            "kind": "keystroke",
            "file_path": "/repo/lib.rs",
            "characters_added": 3,
        });
        let event = parse_event(value).expect("valid event");
        assert_eq!(event.kind, EventKind::Keystroke);
        assert_eq!(event.characters_added, 3);
    }

    #[test]
    fn parse_event_rejects_unknown_fields() {
        let value = serde_json::json!({
            "event_id": "evt-3",
            "recorded_at": "2026-01-30T12:00:00Z",
            "kind": "keystroke",
            "file_path": "/repo/lib.rs",
            "bogus": true,
        });
        assert!(parse_event(value).is_err());
    }
}
