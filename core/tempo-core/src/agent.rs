//! The per-window agent context.
//!
//! One `Agent` lives in each editor window process and owns every engine
//! component for that window: the in-memory aggregator, the delivery
//! manager with its offline queue, the primary-window lease, the scheduler,
//! the flow machine, and the account state. It replaces the original
//! design's module-global mutable state with one explicitly constructed and
//! torn-down object.
//!
//! The host feeds `handle_event` from its event loop and calls `tick` on a
//! timer; neither call blocks on the network beyond the transport's own
//! timeout, and no failure propagates out of either.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use ulid::Ulid;

use tempo_protocol::{ApiMethod, EditorEvent, EventKind, HeartbeatKind};

use crate::account::AccountManager;
use crate::aggregate::{ChangeDelta, EventAggregator};
use crate::boundary::SessionBoundaryPolicy;
use crate::clock::{Clock, NowTimes};
use crate::collaborators::{CommitStats, EditorOps, WorkspaceChat};
use crate::delivery::DeliveryManager;
use crate::error::Result;
use crate::flow::{EnableOptions, FlowModeStateMachine, FlowOutcome, FlowState};
use crate::host::host_identity;
use crate::kv::KvStore;
use crate::lease::PrimaryWindowCoordinator;
use crate::net::Transport;
use crate::queue::OfflineQueue;
use crate::scheduler::{GateContext, Scheduler, TaskKind};
use crate::storage::StorageConfig;

pub const HEARTBEATS_PATH: &str = "/v1/heartbeats";
pub const COLLAB_SESSIONS_PATH: &str = "/v1/collab_sessions";

/// Kv key mirroring the open collab session's accrued seconds.
pub const COLLAB_SECONDS_KEY: &str = "collabSessionSeconds";

const LOGIN_PROMPT: &str = "Sign up or log in to see your coding metrics.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub storage: StorageConfig,
    pub plugin_version: String,
    /// Seconds subtracted from UTC to produce local timestamps.
    pub utc_offset_secs: i64,
}

impl AgentConfig {
    pub fn new(storage: StorageConfig, plugin_version: &str) -> Self {
        Self {
            storage,
            plugin_version: plugin_version.to_string(),
            utc_offset_secs: crate::clock::system_utc_offset_secs(),
        }
    }
}

/// An open live-collaboration session bracketed by editor events.
#[derive(Debug, Clone)]
struct CollabSession {
    id: String,
    start: DateTime<Utc>,
    local_start: i64,
}

pub struct Agent {
    config: AgentConfig,
    window_id: String,
    clock: Arc<dyn Clock>,
    kv: KvStore,
    transport: Arc<dyn Transport>,
    editor: Arc<dyn EditorOps>,
    commit_stats: Arc<dyn CommitStats>,
    aggregator: EventAggregator,
    delivery: DeliveryManager,
    lease: PrimaryWindowCoordinator,
    scheduler: Scheduler,
    flow: FlowModeStateMachine,
    account: AccountManager,
    collab: Option<CollabSession>,
    torn_down: bool,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        editor: Arc<dyn EditorOps>,
        chat: Arc<dyn WorkspaceChat>,
        commit_stats: Arc<dyn CommitStats>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config
            .storage
            .ensure_dirs()
            .map_err(|e| crate::error::TempoError::io("create storage dirs", e))?;

        let now = clock.now();
        let window_id = format!("{}-{}", Ulid::new(), std::process::id());

        let kv = KvStore::new(config.storage.session_file());
        let queue = OfflineQueue::new(config.storage.offline_queue_file());
        let delivery = DeliveryManager::new(queue, Arc::clone(&transport), kv.clone());
        let lease = PrimaryWindowCoordinator::new(
            config.storage.lease_file(),
            window_id.clone(),
            std::process::id(),
        );
        let flow = FlowModeStateMachine::new(
            kv.clone(),
            Arc::clone(&transport),
            Arc::clone(&editor),
            chat,
        );
        let account = AccountManager::new(
            kv.clone(),
            Arc::clone(&transport),
            config.plugin_version.clone(),
            config.utc_offset_secs,
        );
        let aggregator = EventAggregator::new(
            &config.plugin_version,
            NowTimes::at(now, config.utc_offset_secs),
        );

        Ok(Self {
            window_id,
            clock,
            kv,
            transport,
            editor,
            commit_stats,
            aggregator,
            delivery,
            lease,
            scheduler: Scheduler::starting_at(now),
            flow,
            account,
            collab: None,
            torn_down: false,
            config,
        })
    }

    pub fn window_id(&self) -> &str {
        &self.window_id
    }

    pub fn is_primary(&self) -> bool {
        self.lease.is_primary(self.clock.now())
    }

    pub fn queue_len(&self) -> usize {
        self.delivery.queue().len()
    }

    pub fn flow_state(&self) -> FlowState {
        self.flow.state()
    }

    /// Startup sequence: claim or defer on the lease, establish identity,
    /// announce ourselves, reconcile flow, and kick an initial drain. All
    /// network-facing pieces are primary-gated and skip quietly offline.
    pub fn bootstrap(&mut self) {
        let now = self.clock.now();
        info!(window = %self.window_id, version = %self.config.plugin_version, "Tempo agent starting");

        self.lease.tick(now);

        let mut created_identity = false;
        if self.transport.is_reachable() {
            created_identity = self.account.create_anonymous_user();
            if created_identity {
                self.editor.show_message(LOGIN_PROMPT);
            }
            self.account.refresh_registration_state();
        }
        self.account.initialize_preferences();

        if self.lease.is_primary(now) && self.transport.is_reachable() {
            let kind = if created_identity {
                HeartbeatKind::Installed
            } else {
                HeartbeatKind::Initialized
            };
            self.send_heartbeat(kind, now);
            self.delivery.drain();
        }

        self.flow.reconcile();
        self.editor.set_status("Tempo");
    }

    /// Routes one validated editor event. Never fails; unknown conditions
    /// degrade to skips.
    pub fn handle_event(&mut self, event: &EditorEvent) {
        let now = self.clock.now();

        match event.kind {
            EventKind::FileOpened | EventKind::FileClosed | EventKind::Keystroke => {
                let Some(path) = event.file_path.as_deref() else {
                    return;
                };
                let delta = ChangeDelta {
                    characters_added: event.characters_added,
                    characters_removed: event.characters_removed,
                    lines_added: event.lines_added,
                    lines_removed: event.lines_removed,
                };
                self.aggregator.record(path, event.kind, delta, now);
            }
            EventKind::FocusGained => {
                // Gates sample focus from the editor predicate; nothing to do.
            }
            EventKind::FocusLost | EventKind::IdleDetected => {
                self.close_session_if_idle(now);
            }
            EventKind::CollabStarted => {
                let Some(id) = event.collab_session_id.clone() else {
                    return;
                };
                if self.collab.is_none() {
                    debug!(collab = %id, "Collab session opened");
                    self.collab = Some(CollabSession {
                        id,
                        start: now,
                        local_start: now.timestamp() - self.config.utc_offset_secs,
                    });
                }
            }
            EventKind::CollabEnded => self.close_collab_session(now),
            EventKind::Shutdown => self.teardown(),
        }
    }

    /// One scheduler round. The host calls this on a coarse timer; cadences
    /// are enforced internally, so over-calling is harmless.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        self.lease.tick(now);

        let gates = GateContext {
            is_primary: self.lease.is_primary(now),
            has_focus: self.editor.has_focus(),
            is_registered: self.account.is_registered(),
        };

        for task in self.scheduler.due(now, &gates) {
            self.run_task(task, now);
        }
    }

    /// Best-effort final flush: close and submit the open aggregate and any
    /// open collab session, then hand off the lease. Safe to call twice.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let now = self.clock.now();
        info!(window = %self.window_id, "Tempo agent shutting down");

        self.close_collab_session(now);

        let policy = SessionBoundaryPolicy::from_preferences(&self.kv, self.config.utc_offset_secs);
        if let Some(closed) = policy.close_for_shutdown(&mut self.aggregator, now) {
            self.delivery.submit(&closed, now);
        }

        self.lease.release();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flow mode surface
    // ─────────────────────────────────────────────────────────────────────

    pub fn enable_flow(&self, opts: EnableOptions) -> FlowOutcome {
        self.flow.enable(opts, self.lease.is_primary(self.clock.now()))
    }

    pub fn disable_flow(&self, automated: bool) -> FlowOutcome {
        self.flow.disable(automated, self.lease.is_primary(self.clock.now()))
    }

    /// External flow-score signal: enter flow automatically iff the user
    /// opted in and we are not already there.
    pub fn on_flow_score(&self) -> FlowOutcome {
        if !self.flow.auto_enter_enabled() || self.flow.is_enabled() {
            return FlowOutcome::NoOp;
        }
        self.enable_flow(EnableOptions {
            automated: true,
            skip_chat_check: false,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn close_session_if_idle(&mut self, now: DateTime<Utc>) {
        let policy = SessionBoundaryPolicy::from_preferences(&self.kv, self.config.utc_offset_secs);
        if let Some(closed) = policy.close_if_idle(&mut self.aggregator, now) {
            debug!(
                keystrokes = closed.keystrokes,
                files = closed.source.len(),
                "Session closed, handing to delivery"
            );
            self.delivery.submit(&closed, now);
        }
    }

    fn run_task(&mut self, task: TaskKind, now: DateTime<Utc>) {
        match task {
            TaskKind::SessionIdentityCheck => {
                if self.transport.is_reachable() && !self.account.session_state_present() {
                    if self.account.create_anonymous_user() {
                        self.account.refresh_registration_state();
                        if self.lease.is_primary(now) {
                            self.delivery.drain();
                        }
                    }
                }
            }
            TaskKind::CommitHistoryRefresh => {
                let disabled = self
                    .kv
                    .get_bool(crate::account::DISABLE_GIT_PREF)
                    .unwrap_or(false);
                if !disabled {
                    self.commit_stats
                        .refresh_commit_history(self.transport.is_reachable());
                }
            }
            TaskKind::Heartbeat => {
                if self.transport.is_reachable() {
                    self.send_heartbeat(HeartbeatKind::Hourly, now);
                }
            }
            TaskKind::OfflineDrain => {
                if self.transport.is_reachable() {
                    let delivered = self.delivery.drain();
                    if delivered > 0 {
                        info!(delivered, "Offline queue drained");
                    }
                }
            }
            TaskKind::RegistrationPoll => {
                if self.transport.is_reachable() && self.account.refresh_registration_state() {
                    self.account.initialize_preferences();
                    self.flow.reconcile();
                    self.editor.show_message("Successfully logged on to Tempo");
                }
            }
            TaskKind::CollabTimeAccrual => {
                if let Some(collab) = &self.collab {
                    let accrued = (now - collab.start).num_seconds().max(0);
                    if let Err(err) = self.kv.set(COLLAB_SECONDS_KEY, json!(accrued)) {
                        warn!(error = %err, "Failed to record collab session time");
                    }
                }
            }
        }
    }

    fn send_heartbeat(&self, kind: HeartbeatKind, now: DateTime<Utc>) {
        let host = host_identity();
        let body = json!({
            "kind": kind,
            "hostname": host.hostname,
            "os": host.os,
            "plugin_version": self.config.plugin_version,
            "occurred_at": now.to_rfc3339(),
        });
        let token = self.kv.get_string(crate::delivery::AUTH_TOKEN_KEY);
        let response =
            self.transport
                .send(ApiMethod::Post, HEARTBEATS_PATH, Some(body), token.as_deref());
        if !response.ok {
            debug!(status = response.status, "Heartbeat skipped");
        }
    }

    /// Posts the closed collab session best-effort; a failure is logged and
    /// dropped; collab time is supplemental, not session telemetry.
    fn close_collab_session(&mut self, now: DateTime<Utc>) {
        let Some(collab) = self.collab.take() else {
            return;
        };

        let body = json!({
            "id": collab.id,
            "start": collab.start.timestamp(),
            "local_start": collab.local_start,
            "end": now.timestamp(),
            "local_end": now.timestamp() - self.config.utc_offset_secs,
        });
        let token = self.kv.get_string(crate::delivery::AUTH_TOKEN_KEY);
        let response = self.transport.send(
            ApiMethod::Post,
            COLLAB_SESSIONS_PATH,
            Some(body),
            token.as_deref(),
        );
        if !response.ok {
            debug!(status = response.status, collab = %collab.id, "Collab session close not delivered");
        }
        let _ = self.kv.remove(COLLAB_SECONDS_KEY);
    }
}
