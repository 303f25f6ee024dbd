//! # tempo-core
//!
//! Core library for Tempo, a background telemetry engine for editor
//! plugins: it aggregates file-level coding activity into session
//! summaries, delivers them to a remote collector with offline spooling,
//! and elects one primary window per machine to own network-facing
//! periodic work.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Hosts wrap calls with
//!   their own async/worker-thread plumbing if needed.
//! - **Not thread-safe**: One `Agent` per window process, driven from that
//!   window's event thread. Cross-window coordination happens only through
//!   shared durable files (kv store, offline queue, lease).
//! - **Graceful degradation**: Missing or corrupt state files read as
//!   empty, network failures are skips, and nothing here throws into the
//!   host's UI layer.
//! - **Idempotency over locking**: The shared files are updated with
//!   read-modify-write cycles, not atomic primitives; rare double-writes
//!   from racing windows are absorbed by identity-keyed upserts.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tempo_core::{Agent, AgentConfig, StorageConfig};
//!
//! let config = AgentConfig::new(StorageConfig::default(), "1.0.0");
//! let mut agent = Agent::new(config, transport, editor, chat, commits, clock)?;
//! agent.bootstrap();
//! // feed events / tick from the host loop...
//! agent.teardown();
//! ```

// Public modules
pub mod account;
pub mod agent;
pub mod aggregate;
pub mod boundary;
pub mod clock;
pub mod collaborators;
pub mod delivery;
pub mod error;
pub mod flow;
pub mod host;
pub mod kv;
pub mod lease;
pub mod net;
pub mod project;
pub mod queue;
pub mod scheduler;
pub mod storage;

// Re-export commonly used items at crate root
pub use account::AccountManager;
pub use agent::{Agent, AgentConfig};
pub use aggregate::{ChangeDelta, EventAggregator, FileChangeRecord, SessionAggregate};
pub use boundary::SessionBoundaryPolicy;
pub use clock::{Clock, ManualClock, NowTimes, SystemClock};
pub use collaborators::{
    CommitStats, EditorOps, HeadlessEditor, NoopChat, NoopCommitStats, ScreenMode, WorkspaceChat,
};
pub use delivery::DeliveryManager;
pub use error::{Result, TempoError};
pub use flow::{EnableOptions, FlowModeStateMachine, FlowOutcome, FlowState};
pub use kv::KvStore;
pub use lease::PrimaryWindowCoordinator;
pub use net::{OfflineTransport, Transport};
pub use project::ProjectIdentity;
pub use queue::{OfflineQueue, QueueEntry};
pub use scheduler::{GateContext, Scheduler, TaskGate, TaskKind};
pub use storage::StorageConfig;
