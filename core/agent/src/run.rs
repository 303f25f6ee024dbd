//! Event loop and status reporting for the reference host.

use std::io::BufRead;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use tempo_core::{
    Agent, AgentConfig, EditorOps, KvStore, NoopChat, NoopCommitStats, OfflineQueue,
    OfflineTransport, PrimaryWindowCoordinator, ScreenMode, StorageConfig, SystemClock,
};
use tempo_protocol::parse_event;

/// Editor boundary for a terminal host: always focused, messages and
/// status go to the log instead of a status bar.
struct TerminalEditor;

impl EditorOps for TerminalEditor {
    fn has_focus(&self) -> bool {
        true
    }

    fn show_message(&self, message: &str) {
        info!(message = %message, "agent message");
    }

    fn set_status(&self, text: &str) {
        debug!(status = %text, "status update");
    }

    fn apply_screen_mode(&self, _mode: ScreenMode) {
        // No screen to manage in a terminal host.
    }
}

pub fn run(storage: StorageConfig, tick_secs: u64) -> Result<(), String> {
    let config = AgentConfig::new(storage, env!("CARGO_PKG_VERSION"));
    let mut agent = Agent::new(
        config,
        Arc::new(OfflineTransport),
        Arc::new(TerminalEditor),
        Arc::new(NoopChat),
        Arc::new(NoopCommitStats),
        Arc::new(SystemClock),
    )
    .map_err(|e| e.to_string())?;

    agent.bootstrap();

    // Stdin is read on its own thread so ticks keep firing while the feed
    // is quiet. Channel close doubles as the EOF signal.
    let (tx, rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "stdin read failed");
                    break;
                }
            }
        }
    });

    loop {
        match rx.recv_timeout(Duration::from_secs(tick_secs)) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str(trimmed)
                    .map_err(|e| e.to_string())
                    .and_then(|value| parse_event(value).map_err(|e| e.to_string()))
                {
                    Ok(event) => agent.handle_event(&event),
                    Err(err) => warn!(error = %err, "Dropped malformed event line"),
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => agent.tick(),
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    agent.teardown();
    Ok(())
}

pub fn print_status(storage: &StorageConfig) -> Result<(), String> {
    let queue = OfflineQueue::new(storage.offline_queue_file());
    let kv = KvStore::new(storage.session_file());
    let lease = PrimaryWindowCoordinator::new(
        storage.lease_file(),
        "status-probe".to_string(),
        std::process::id(),
    );

    let holder = lease.current_holder();
    let status = serde_json::json!({
        "queue_depth": queue.len(),
        "registered": kv.get_string(tempo_core::account::ACCOUNT_NAME_KEY).is_some(),
        "in_flow": kv
            .get_bool(tempo_core::flow::FLOW_STATE_KEY)
            .unwrap_or(false),
        "lease": holder.map(|l| serde_json::json!({
            "holder_id": l.holder_id,
            "pid": l.pid,
            "acquired_at": l.acquired_at,
            "renewed_at": l.renewed_at,
        })),
    });

    println!(
        "{}",
        serde_json::to_string_pretty(&status).map_err(|e| e.to_string())?
    );
    Ok(())
}
