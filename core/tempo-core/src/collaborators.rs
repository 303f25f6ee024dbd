//! Seams to the host editor and other external collaborators.
//!
//! The engine never renders UI, runs git, or talks to workspace chat
//! itself; it calls these traits and hosts wire in the real integrations.
//! No-op defaults keep headless hosts (tests, the reference binary) honest.

/// Screen presentation applied when flow mode toggles. Local and
/// idempotent; safe to apply on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenMode {
    Normal,
    FullScreen,
    Zen,
}

/// The editor boundary: focus predicate plus the message/status sinks.
pub trait EditorOps: Send + Sync {
    /// Whether this window currently has input focus.
    fn has_focus(&self) -> bool;

    /// One-shot user-facing message (signup prompts and the like).
    fn show_message(&self, message: &str);

    /// Status bar text sink.
    fn set_status(&self, text: &str);

    /// Applies a screen presentation mode. Must be idempotent.
    fn apply_screen_mode(&self, mode: ScreenMode);
}

/// Workspace-chat integration consulted before entering flow mode.
pub trait WorkspaceChat: Send + Sync {
    /// Connectivity prerequisite for flow; a failed check aborts the
    /// transition quietly.
    fn flow_checks_pass(&self) -> bool {
        true
    }
}

/// Git-derived commit statistics live outside this engine; the scheduler
/// only hands the collaborator its refresh tick.
pub trait CommitStats: Send + Sync {
    fn refresh_commit_history(&self, server_reachable: bool);
}

/// Headless editor: no focus, swallows all sinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessEditor;

impl EditorOps for HeadlessEditor {
    fn has_focus(&self) -> bool {
        false
    }
    fn show_message(&self, _message: &str) {}
    fn set_status(&self, _text: &str) {}
    fn apply_screen_mode(&self, _mode: ScreenMode) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopChat;

impl WorkspaceChat for NoopChat {}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCommitStats;

impl CommitStats for NoopCommitStats {
    fn refresh_commit_history(&self, _server_reachable: bool) {}
}
