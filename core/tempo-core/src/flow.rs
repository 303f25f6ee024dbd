//! Flow mode: a server-side focus-session resource toggled locally.
//!
//! The machine has two real states, Idle and Flow, plus Unknown before the
//! first reconciliation. The flow flag lives in the shared kv store so all
//! windows agree; only the primary window talks to the server, and both
//! transitions are no-ops when already at the target state, so repeated
//! automated triggers cost one idempotent screen-mode application, never a
//! duplicate server call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use tempo_protocol::ApiMethod;

use crate::account::ACCOUNT_NAME_KEY;
use crate::collaborators::{EditorOps, ScreenMode, WorkspaceChat};
use crate::delivery::AUTH_TOKEN_KEY;
use crate::kv::KvStore;
use crate::net::Transport;

pub const FLOW_SESSIONS_PATH: &str = "/v1/flow_sessions";

/// Kv keys: the persisted flow flag, the preferred screen mode, the
/// auto-enter preference, and the external collaborator's trigger markers
/// that suppress our own automated transitions.
pub const FLOW_STATE_KEY: &str = "inFlowMode";
pub const SCREEN_MODE_PREF: &str = "flowMode.screenMode";
pub const AUTO_ENTER_PREF: &str = "flowMode.editor.autoEnterFlowMode";
pub const AUTO_FLOW_TRIGGER_KEY: &str = "autoFlowModeTrigger";
pub const AUTO_FLOW_DISABLE_TRIGGER_KEY: &str = "autoFlowModeDisabledTrigger";

const SIGNUP_PROMPT: &str = "To use Flow Mode, please first sign up or log in.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Flow,
    /// Not yet reconciled against the server.
    Unknown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnableOptions {
    pub automated: bool,
    pub skip_chat_check: bool,
}

/// What a transition attempt did, for callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    Entered,
    Exited,
    NoOp,
    RequiresRegistration,
    ChatCheckFailed,
}

pub struct FlowModeStateMachine {
    kv: KvStore,
    transport: Arc<dyn Transport>,
    editor: Arc<dyn EditorOps>,
    chat: Arc<dyn WorkspaceChat>,
    signup_prompted: AtomicBool,
}

impl FlowModeStateMachine {
    pub fn new(
        kv: KvStore,
        transport: Arc<dyn Transport>,
        editor: Arc<dyn EditorOps>,
        chat: Arc<dyn WorkspaceChat>,
    ) -> Self {
        Self {
            kv,
            transport,
            editor,
            chat,
            signup_prompted: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> FlowState {
        match self.kv.get_bool(FLOW_STATE_KEY) {
            Some(true) => FlowState::Flow,
            Some(false) => FlowState::Idle,
            None => FlowState::Unknown,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state() == FlowState::Flow
    }

    /// Whether automated entry is enabled by user preference.
    pub fn auto_enter_enabled(&self) -> bool {
        self.kv.get_bool(AUTO_ENTER_PREF).unwrap_or(false)
    }

    /// Idle → Flow. `is_primary` is sampled by the caller from the lease so
    /// the machine stays free of coordination concerns.
    pub fn enable(&self, opts: EnableOptions, is_primary: bool) -> FlowOutcome {
        if self.kv.get_string(ACCOUNT_NAME_KEY).is_none() {
            if !self.signup_prompted.swap(true, Ordering::Relaxed) {
                self.editor.show_message(SIGNUP_PROMPT);
            }
            return FlowOutcome::RequiresRegistration;
        }

        if !opts.skip_chat_check && !self.chat.flow_checks_pass() {
            debug!("Workspace chat check failed, staying out of flow");
            return FlowOutcome::ChatCheckFailed;
        }

        // An external collaborator with its own automated trigger owns
        // automated transitions; ours would double-fire.
        let allow = !opts.automated || self.kv.get(AUTO_FLOW_TRIGGER_KEY).is_none();

        let mut outcome = FlowOutcome::NoOp;
        if allow && is_primary && !self.is_enabled() {
            let _ = self.kv.set(FLOW_STATE_KEY, json!(true));
            info!(automated = opts.automated, "Entering flow mode");
            let token = self.kv.get_string(AUTH_TOKEN_KEY);
            self.transport.send(
                ApiMethod::Post,
                FLOW_SESSIONS_PATH,
                Some(json!({ "automated": opts.automated })),
                token.as_deref(),
            );
            outcome = FlowOutcome::Entered;
        }

        // Local, idempotent UI effect: applied regardless of primary status.
        self.editor.apply_screen_mode(self.configured_screen_mode());
        self.update_status();
        outcome
    }

    /// Flow → Idle. Always restores the normal screen mode.
    pub fn disable(&self, automated: bool, is_primary: bool) -> FlowOutcome {
        let allow = !automated || self.kv.get(AUTO_FLOW_DISABLE_TRIGGER_KEY).is_none();

        let mut outcome = FlowOutcome::NoOp;
        if allow && is_primary && self.is_enabled() {
            let _ = self.kv.set(FLOW_STATE_KEY, json!(false));
            info!("Exiting flow mode");
            let token = self.kv.get_string(AUTH_TOKEN_KEY);
            self.transport
                .send(ApiMethod::Delete, FLOW_SESSIONS_PATH, None, token.as_deref());
            outcome = FlowOutcome::Exited;
        }

        self.editor.apply_screen_mode(ScreenMode::Normal);
        self.update_status();
        outcome
    }

    /// Startup/login reconciliation: mirror the server's open flow sessions
    /// into the local flag without calling enable/disable (no spurious
    /// server round trip).
    pub fn reconcile(&self) -> FlowState {
        let enabled = match self.kv.get_string(AUTH_TOKEN_KEY) {
            Some(token) => {
                let response =
                    self.transport
                        .send(ApiMethod::Get, FLOW_SESSIONS_PATH, None, Some(&token));
                if !response.ok {
                    // Leave the local flag as-is; reconcile again next login.
                    return self.state();
                }
                response
                    .data
                    .as_ref()
                    .and_then(|data| data.get("flow_sessions"))
                    .and_then(Value::as_array)
                    .map(|sessions| !sessions.is_empty())
                    .unwrap_or(false)
            }
            None => false,
        };

        let _ = self.kv.set(FLOW_STATE_KEY, json!(enabled));
        self.update_status();
        self.state()
    }

    fn configured_screen_mode(&self) -> ScreenMode {
        match self.kv.get_string(SCREEN_MODE_PREF).as_deref() {
            Some("fullScreen") => ScreenMode::FullScreen,
            Some("zen") => ScreenMode::Zen,
            _ => ScreenMode::Normal,
        }
    }

    fn update_status(&self) {
        let text = if self.is_enabled() { "Flow" } else { "Tempo" };
        self.editor.set_status(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::testing::{RecordingEditor, StubChat};
    use crate::net::testing::MockTransport;
    use tempfile::tempdir;
    use tempo_protocol::ApiResponse;

    struct Fixture {
        machine: FlowModeStateMachine,
        transport: Arc<MockTransport>,
        editor: Arc<RecordingEditor>,
        kv: KvStore,
    }

    fn fixture(temp: &tempfile::TempDir) -> Fixture {
        fixture_with_chat(temp, Arc::new(StubChat::passing()))
    }

    fn fixture_with_chat(temp: &tempfile::TempDir, chat: Arc<StubChat>) -> Fixture {
        let kv = KvStore::new(temp.path().join("session.json"));
        kv.set(AUTH_TOKEN_KEY, json!("token")).unwrap();
        kv.set(ACCOUNT_NAME_KEY, json!("dev@example.com")).unwrap();
        let transport = Arc::new(MockTransport::new());
        let editor = Arc::new(RecordingEditor::focused());
        let machine = FlowModeStateMachine::new(
            kv.clone(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::clone(&editor) as Arc<dyn EditorOps>,
            chat,
        );
        Fixture {
            machine,
            transport,
            editor,
            kv,
        }
    }

    #[test]
    fn enable_enters_flow_and_posts_once() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);

        let outcome = f.machine.enable(EnableOptions::default(), true);
        assert_eq!(outcome, FlowOutcome::Entered);
        assert_eq!(f.machine.state(), FlowState::Flow);
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 1);
    }

    #[test]
    fn double_enable_is_one_server_call_two_screen_applies() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);

        assert_eq!(f.machine.enable(EnableOptions::default(), true), FlowOutcome::Entered);
        assert_eq!(f.machine.enable(EnableOptions::default(), true), FlowOutcome::NoOp);

        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 1);
        assert_eq!(f.editor.screen_mode_count(), 2);
    }

    #[test]
    fn double_disable_is_one_server_call() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.machine.enable(EnableOptions::default(), true);

        assert_eq!(f.machine.disable(false, true), FlowOutcome::Exited);
        assert_eq!(f.machine.disable(false, true), FlowOutcome::NoOp);

        // One POST on enable, one DELETE on the first disable.
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 2);
    }

    #[test]
    fn non_primary_window_applies_screen_mode_without_server_call() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);

        let outcome = f.machine.enable(EnableOptions::default(), false);
        assert_eq!(outcome, FlowOutcome::NoOp);
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 0);
        assert_eq!(f.editor.screen_mode_count(), 1);
        // The flag stays untouched for the primary to own.
        assert_eq!(f.machine.state(), FlowState::Unknown);
    }

    #[test]
    fn unregistered_user_gets_one_signup_prompt() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.kv.remove(ACCOUNT_NAME_KEY).unwrap();

        assert_eq!(
            f.machine.enable(EnableOptions::default(), true),
            FlowOutcome::RequiresRegistration
        );
        assert_eq!(
            f.machine.enable(EnableOptions::default(), true),
            FlowOutcome::RequiresRegistration
        );
        assert_eq!(f.editor.message_count(), 1);
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 0);
    }

    #[test]
    fn failed_chat_check_aborts_quietly() {
        let temp = tempdir().unwrap();
        let f = fixture_with_chat(&temp, Arc::new(StubChat::failing()));

        assert_eq!(
            f.machine.enable(EnableOptions::default(), true),
            FlowOutcome::ChatCheckFailed
        );
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 0);
        assert_eq!(f.editor.screen_mode_count(), 0);
    }

    #[test]
    fn skip_chat_check_bypasses_the_gate() {
        let temp = tempdir().unwrap();
        let f = fixture_with_chat(&temp, Arc::new(StubChat::failing()));

        let opts = EnableOptions {
            automated: false,
            skip_chat_check: true,
        };
        assert_eq!(f.machine.enable(opts, true), FlowOutcome::Entered);
    }

    #[test]
    fn external_trigger_suppresses_automated_entry_only() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.kv.set(AUTO_FLOW_TRIGGER_KEY, json!({"configured": true}))
            .unwrap();

        let automated = EnableOptions {
            automated: true,
            skip_chat_check: false,
        };
        assert_eq!(f.machine.enable(automated, true), FlowOutcome::NoOp);

        // A manual enable still goes through.
        assert_eq!(
            f.machine.enable(EnableOptions::default(), true),
            FlowOutcome::Entered
        );
    }

    #[test]
    fn configured_screen_mode_is_applied() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.kv.set(SCREEN_MODE_PREF, json!("zen")).unwrap();

        f.machine.enable(EnableOptions::default(), true);
        assert_eq!(
            f.editor.screen_modes.lock().unwrap().as_slice(),
            &[ScreenMode::Zen]
        );
    }

    #[test]
    fn disable_always_restores_normal_screen() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);

        // Not primary, not in flow: still restores the screen.
        assert_eq!(f.machine.disable(false, false), FlowOutcome::NoOp);
        assert_eq!(
            f.editor.screen_modes.lock().unwrap().as_slice(),
            &[ScreenMode::Normal]
        );
    }

    #[test]
    fn reconcile_mirrors_open_server_sessions() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.transport.script(ApiResponse::ok(
            200,
            json!({"flow_sessions": [{"id": 1}]}),
        ));

        assert_eq!(f.machine.reconcile(), FlowState::Flow);
        // Exactly one GET, no enable/disable round trip.
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 1);
    }

    #[test]
    fn reconcile_with_no_sessions_lands_idle() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.transport
            .script(ApiResponse::ok(200, json!({"flow_sessions": []})));

        assert_eq!(f.machine.reconcile(), FlowState::Idle);
    }

    #[test]
    fn reconcile_without_token_lands_idle_without_network() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.kv.remove(AUTH_TOKEN_KEY).unwrap();

        assert_eq!(f.machine.reconcile(), FlowState::Idle);
        assert_eq!(f.transport.calls_to(FLOW_SESSIONS_PATH), 0);
    }

    #[test]
    fn reconcile_keeps_local_state_when_server_unreachable() {
        let temp = tempdir().unwrap();
        let f = fixture(&temp);
        f.kv.set(FLOW_STATE_KEY, json!(true)).unwrap();
        f.transport.set_reachable(false);

        assert_eq!(f.machine.reconcile(), FlowState::Flow);
    }
}
