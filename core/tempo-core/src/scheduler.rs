//! Periodic task scheduling.
//!
//! One scheduler owns every recurring cadence in the engine, replacing the
//! original scatter of independent timers so that cadences and their gates
//! are auditable in one table and testable with an injected clock.
//!
//! Interval semantics: a task whose cadence has elapsed consumes its tick
//! whether or not its gate passes; a non-primary window does not bank
//! heartbeats for later. Network reachability is checked by the task
//! runner, not here; an unreachable server is a normal per-tick skip.

use chrono::{DateTime, Utc};

/// The engine's recurring jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Verify local identity state still exists; regenerate if missing.
    SessionIdentityCheck,
    /// Hand off to the external commit-stats collaborator.
    CommitHistoryRefresh,
    /// Collector heartbeat.
    Heartbeat,
    /// Drain the offline payload queue.
    OfflineDrain,
    /// Poll whether the user completed registration.
    RegistrationPoll,
    /// Accrue open live-collaboration session time.
    CollabTimeAccrual,
}

/// Who may run a task on a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskGate {
    Always,
    /// Network-facing periodic work: only the lease holder runs it.
    PrimaryOnly,
    /// Only while the window has input focus.
    FocusedOnly,
    /// Only while focused and the user is not yet registered.
    FocusedUnregistered,
}

/// Cadence table. All network-facing entries are primary-gated; purely
/// local bookkeeping is not.
const TASK_TABLE: &[(TaskKind, i64, TaskGate)] = &[
    (TaskKind::SessionIdentityCheck, 35 * 60, TaskGate::Always),
    (TaskKind::CommitHistoryRefresh, 45 * 60, TaskGate::Always),
    (TaskKind::Heartbeat, 2 * 60 * 60, TaskGate::PrimaryOnly),
    (TaskKind::OfflineDrain, 30 * 60, TaskGate::PrimaryOnly),
    (TaskKind::RegistrationPoll, 10 * 60, TaskGate::FocusedUnregistered),
    (TaskKind::CollabTimeAccrual, 60, TaskGate::FocusedOnly),
];

/// Gate inputs sampled once per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateContext {
    pub is_primary: bool,
    pub has_focus: bool,
    pub is_registered: bool,
}

impl TaskGate {
    fn passes(self, ctx: &GateContext) -> bool {
        match self {
            TaskGate::Always => true,
            TaskGate::PrimaryOnly => ctx.is_primary,
            TaskGate::FocusedOnly => ctx.has_focus,
            TaskGate::FocusedUnregistered => ctx.has_focus && !ctx.is_registered,
        }
    }
}

#[derive(Debug)]
struct ScheduledTask {
    kind: TaskKind,
    cadence_secs: i64,
    gate: TaskGate,
    last_run: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
}

impl Scheduler {
    /// All cadences are armed from `start`: the first firing of each task is
    /// one full cadence after startup, matching interval-timer behavior.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        let tasks = TASK_TABLE
            .iter()
            .map(|&(kind, cadence_secs, gate)| ScheduledTask {
                kind,
                cadence_secs,
                gate,
                last_run: start,
            })
            .collect();
        Self { tasks }
    }

    /// Returns the tasks to run now. Every task whose cadence has elapsed is
    /// re-armed at `now`; only those whose gate passes are returned.
    pub fn due(&mut self, now: DateTime<Utc>, ctx: &GateContext) -> Vec<TaskKind> {
        let mut runnable = Vec::new();

        for task in &mut self.tasks {
            if (now - task.last_run).num_seconds() < task.cadence_secs {
                continue;
            }
            task.last_run = now;
            if task.gate.passes(ctx) {
                runnable.push(task.kind);
            }
        }

        runnable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
    }

    fn all_gates() -> GateContext {
        GateContext {
            is_primary: true,
            has_focus: true,
            is_registered: false,
        }
    }

    #[test]
    fn nothing_is_due_immediately_after_start() {
        let mut scheduler = Scheduler::starting_at(t0());
        assert!(scheduler
            .due(t0() + chrono::Duration::seconds(30), &all_gates())
            .is_empty());
    }

    #[test]
    fn collab_accrual_fires_every_minute_while_focused() {
        let mut scheduler = Scheduler::starting_at(t0());
        let due = scheduler.due(t0() + chrono::Duration::seconds(61), &all_gates());
        assert_eq!(due, vec![TaskKind::CollabTimeAccrual]);
    }

    #[test]
    fn unfocused_window_skips_focus_gated_tasks() {
        let mut scheduler = Scheduler::starting_at(t0());
        let ctx = GateContext {
            is_primary: true,
            has_focus: false,
            is_registered: false,
        };
        assert!(scheduler
            .due(t0() + chrono::Duration::seconds(61), &ctx)
            .is_empty());
    }

    #[test]
    fn gated_task_consumes_its_tick() {
        let mut scheduler = Scheduler::starting_at(t0());
        let non_primary = GateContext {
            is_primary: false,
            has_focus: false,
            is_registered: true,
        };

        // Drain cadence elapses while not primary: the tick is consumed.
        let first = scheduler.due(t0() + chrono::Duration::seconds(31 * 60), &non_primary);
        assert!(first.is_empty());

        // Becoming primary a minute later does not fire it early.
        let primary = GateContext {
            is_primary: true,
            ..non_primary
        };
        let second = scheduler.due(t0() + chrono::Duration::seconds(32 * 60), &primary);
        assert!(!second.contains(&TaskKind::OfflineDrain));

        // A full cadence after the consumed tick, it fires.
        let third = scheduler.due(t0() + chrono::Duration::seconds(62 * 60), &primary);
        assert!(third.contains(&TaskKind::OfflineDrain));
    }

    #[test]
    fn registration_poll_stops_once_registered() {
        let mut scheduler = Scheduler::starting_at(t0());
        let registered = GateContext {
            is_primary: true,
            has_focus: true,
            is_registered: true,
        };
        let due = scheduler.due(t0() + chrono::Duration::seconds(11 * 60), &registered);
        assert!(!due.contains(&TaskKind::RegistrationPoll));
    }

    #[test]
    fn long_cadences_fire_in_order() {
        let mut scheduler = Scheduler::starting_at(t0());
        let ctx = all_gates();

        let due = scheduler.due(t0() + chrono::Duration::seconds(2 * 60 * 60 + 1), &ctx);
        assert!(due.contains(&TaskKind::Heartbeat));
        assert!(due.contains(&TaskKind::OfflineDrain));
        assert!(due.contains(&TaskKind::SessionIdentityCheck));
        assert!(due.contains(&TaskKind::CommitHistoryRefresh));
    }

    #[test]
    fn tasks_rearm_after_firing() {
        let mut scheduler = Scheduler::starting_at(t0());
        let ctx = all_gates();

        let first = scheduler.due(t0() + chrono::Duration::seconds(61), &ctx);
        assert_eq!(first, vec![TaskKind::CollabTimeAccrual]);

        // 30 seconds later the minute cadence has not elapsed again.
        let second = scheduler.due(t0() + chrono::Duration::seconds(91), &ctx);
        assert!(second.is_empty());

        let third = scheduler.due(t0() + chrono::Duration::seconds(122), &ctx);
        assert_eq!(third, vec![TaskKind::CollabTimeAccrual]);
    }
}
