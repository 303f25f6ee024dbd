//! In-memory accumulation of file-change activity for one coding session.
//!
//! One aggregator lives per window process and is only ever touched from
//! that window's event thread; cross-window coordination happens later, at
//! the delivery layer. Recording never fails and never touches disk.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempo_protocol::{EventKind, SCHEMA_VERSION};

use crate::clock::NowTimes;
use crate::host::host_identity;
use crate::project::ProjectIdentity;

/// Consecutive events closer together than this count toward active time.
const ACTIVE_GAP_SECS: i64 = 60;

/// Per-file activity counters. Never shared across sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeRecord {
    pub open: u64,
    pub close: u64,
    pub keystrokes: u64,
    pub characters_added: u64,
    pub characters_removed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

/// Character/line deltas carried by a single keystroke event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDelta {
    pub characters_added: u64,
    pub characters_removed: u64,
    pub lines_added: u64,
    pub lines_removed: u64,
}

/// One session's worth of aggregated activity, in the exact shape posted to
/// the collector. `end`/`local_end` stay 0 while the session is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAggregate {
    pub schema_version: u32,
    pub source: BTreeMap<String, FileChangeRecord>,
    pub keystrokes: u64,
    pub start: i64,
    pub local_start: i64,
    pub end: i64,
    pub local_end: i64,
    pub project: ProjectIdentity,
    pub hostname: String,
    pub os: String,
    pub plugin_version: String,
    pub elapsed_seconds: i64,
    pub elapsed_active_seconds: i64,
}

impl SessionAggregate {
    fn open_at(start: NowTimes, plugin_version: &str) -> Self {
        let host = host_identity();
        SessionAggregate {
            schema_version: SCHEMA_VERSION,
            source: BTreeMap::new(),
            keystrokes: 0,
            start: start.utc.timestamp(),
            local_start: start.local_secs,
            end: 0,
            local_end: 0,
            project: ProjectIdentity::unnamed(),
            hostname: host.hostname.clone(),
            os: host.os.clone(),
            plugin_version: plugin_version.to_string(),
            elapsed_seconds: 0,
            elapsed_active_seconds: 0,
        }
    }
}

/// Accumulates editor events into the current [`SessionAggregate`].
pub struct EventAggregator {
    aggregate: SessionAggregate,
    plugin_version: String,
    last_activity: Option<DateTime<Utc>>,
}

impl EventAggregator {
    pub fn new(plugin_version: &str, start: NowTimes) -> Self {
        Self {
            aggregate: SessionAggregate::open_at(start, plugin_version),
            plugin_version: plugin_version.to_string(),
            last_activity: None,
        }
    }

    /// Records one file-level event. In-memory only; never blocks, never fails.
    pub fn record(&mut self, file_path: &str, kind: EventKind, delta: ChangeDelta, now: DateTime<Utc>) {
        let record = self.aggregate.source.entry(file_path.to_string()).or_default();

        match kind {
            EventKind::FileOpened => record.open += 1,
            EventKind::FileClosed => record.close += 1,
            EventKind::Keystroke => {
                record.keystrokes += 1;
                record.characters_added += delta.characters_added;
                record.characters_removed += delta.characters_removed;
                record.lines_added += delta.lines_added;
                record.lines_removed += delta.lines_removed;
                self.aggregate.keystrokes += 1;
            }
            // Non-file events are not recorded here.
            _ => {}
        }

        if self.aggregate.project == ProjectIdentity::unnamed() {
            if let Some(project) = crate::project::resolve_project(file_path) {
                self.aggregate.project = project;
            }
        }

        self.touch_activity(now);
    }

    /// Marks activity without mutating any file record (focus changes,
    /// collab events). Keeps the active-time accrual honest.
    pub fn touch_activity(&mut self, now: DateTime<Utc>) {
        if let Some(last) = self.last_activity {
            let gap = (now - last).num_seconds();
            if (0..=ACTIVE_GAP_SECS).contains(&gap) {
                self.aggregate.elapsed_active_seconds += gap;
            }
        }
        self.last_activity = Some(now);
    }

    /// Timestamp of the most recent recorded activity, if any.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    /// Deep copy of the current aggregate for inspection.
    pub fn snapshot(&self) -> SessionAggregate {
        self.aggregate.clone()
    }

    /// Whether the aggregate is worth emitting.
    ///
    /// Prunes file records that carry only a dangling open or a dangling
    /// close with zero keystrokes, then re-tallies. The per-file keystroke
    /// sum is authoritative: when it disagrees with the cached session
    /// total, the sum wins.
    pub fn has_data(&mut self) -> bool {
        if self.aggregate.source.is_empty() {
            return false;
        }

        let mut found = self.aggregate.keystrokes > 0;
        let mut tally: u64 = 0;

        self.aggregate.source.retain(|_, record| {
            let has_open = record.open > 0;
            let has_close = record.close > 0;
            let has_keystrokes = record.keystrokes > 0;
            tally += record.keystrokes;

            if (has_open && !has_close && !has_keystrokes)
                || (has_close && !has_open && !has_keystrokes)
            {
                return false;
            }
            if !found && has_open && has_close {
                found = true;
            }
            true
        });

        if tally > 0 && tally != self.aggregate.keystrokes {
            self.aggregate.keystrokes = tally;
            found = true;
        }

        found
    }

    /// Closes the current aggregate, stamping `end` with the supplied times,
    /// and immediately reopens a fresh one at `restart`. From the caller's
    /// perspective there is always exactly one live aggregate.
    pub fn take_closed(&mut self, end: NowTimes, restart: NowTimes) -> SessionAggregate {
        let fresh = SessionAggregate::open_at(restart, &self.plugin_version);
        let mut closed = std::mem::replace(&mut self.aggregate, fresh);
        self.last_activity = None;

        closed.end = end.utc.timestamp();
        closed.local_end = end.local_secs;
        closed.elapsed_seconds = (closed.end - closed.start).max(0);
        closed.elapsed_active_seconds = closed
            .elapsed_active_seconds
            .min(closed.elapsed_seconds);
        closed
    }

    /// Discards the current aggregate and starts over.
    pub fn reset(&mut self, start: NowTimes) {
        self.aggregate = SessionAggregate::open_at(start, &self.plugin_version);
        self.last_activity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn times(utc: DateTime<Utc>) -> NowTimes {
        NowTimes::at(utc, 0)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    fn aggregator() -> EventAggregator {
        EventAggregator::new("0.3.1", times(t0()))
    }

    #[test]
    fn empty_aggregate_has_no_data() {
        let mut agg = aggregator();
        assert!(!agg.has_data());
    }

    #[test]
    fn open_and_close_without_keystrokes_counts_as_data() {
        let mut agg = aggregator();
        agg.record("a.ts", EventKind::FileOpened, ChangeDelta::default(), t0());
        agg.record("a.ts", EventKind::FileClosed, ChangeDelta::default(), t0());
        assert!(agg.has_data());
    }

    #[test]
    fn lone_open_is_pruned() {
        let mut agg = aggregator();
        agg.record("b.ts", EventKind::FileOpened, ChangeDelta::default(), t0());
        assert!(!agg.has_data());
        assert!(agg.snapshot().source.is_empty());
    }

    #[test]
    fn lone_close_is_pruned() {
        let mut agg = aggregator();
        agg.record("b.ts", EventKind::FileClosed, ChangeDelta::default(), t0());
        assert!(!agg.has_data());
    }

    #[test]
    fn keystrokes_keep_a_lone_open_alive() {
        let mut agg = aggregator();
        agg.record("c.rs", EventKind::FileOpened, ChangeDelta::default(), t0());
        agg.record("c.rs", EventKind::Keystroke, ChangeDelta::default(), t0());
        assert!(agg.has_data());
        assert_eq!(agg.snapshot().source.len(), 1);
    }

    #[test]
    fn per_file_tally_overrides_cached_total() {
        let mut agg = aggregator();
        agg.record("d.rs", EventKind::Keystroke, ChangeDelta::default(), t0());
        agg.record("d.rs", EventKind::Keystroke, ChangeDelta::default(), t0());
        // Simulate total drift the way a forced snapshot restore could.
        agg.aggregate.keystrokes = 7;
        assert!(agg.has_data());
        assert_eq!(agg.snapshot().keystrokes, 2);
    }

    #[test]
    fn keystroke_deltas_accumulate() {
        let mut agg = aggregator();
        let delta = ChangeDelta {
            characters_added: 4,
            characters_removed: 1,
            lines_added: 1,
            lines_removed: 0,
        };
        agg.record("e.rs", EventKind::Keystroke, delta, t0());
        agg.record("e.rs", EventKind::Keystroke, delta, t0());

        let snap = agg.snapshot();
        let record = snap.source.get("e.rs").unwrap();
        assert_eq!(record.keystrokes, 2);
        assert_eq!(record.characters_added, 8);
        assert_eq!(record.characters_removed, 2);
        assert_eq!(record.lines_added, 2);
    }

    #[test]
    fn active_seconds_accrue_only_across_short_gaps() {
        let mut agg = aggregator();
        let start = t0();
        agg.record("f.rs", EventKind::Keystroke, ChangeDelta::default(), start);
        agg.record(
            "f.rs",
            EventKind::Keystroke,
            ChangeDelta::default(),
            start + chrono::Duration::seconds(30),
        );
        // A long pause should not count toward active time.
        agg.record(
            "f.rs",
            EventKind::Keystroke,
            ChangeDelta::default(),
            start + chrono::Duration::seconds(500),
        );
        assert_eq!(agg.snapshot().elapsed_active_seconds, 30);
    }

    #[test]
    fn take_closed_stamps_end_and_reopens() {
        let mut agg = aggregator();
        let activity_at = t0() + chrono::Duration::seconds(120);
        agg.record("g.rs", EventKind::Keystroke, ChangeDelta::default(), activity_at);

        let restart_at = t0() + chrono::Duration::seconds(1200);
        let closed = agg.take_closed(times(activity_at), times(restart_at));

        assert_eq!(closed.end, activity_at.timestamp());
        assert_eq!(closed.elapsed_seconds, 120);

        let reopened = agg.snapshot();
        assert_eq!(reopened.start, restart_at.timestamp());
        assert_eq!(reopened.end, 0);
        assert!(reopened.source.is_empty());
    }

    #[test]
    fn snapshot_does_not_mutate_state() {
        let mut agg = aggregator();
        agg.record("h.rs", EventKind::FileOpened, ChangeDelta::default(), t0());
        let before = agg.snapshot();
        let _ = agg.snapshot();
        assert_eq!(before, agg.snapshot());
    }
}
