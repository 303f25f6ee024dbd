//! Session boundary policy: when the open aggregate closes.
//!
//! Two close paths only: an idle/focus-loss event whose gap since the last
//! recorded activity reaches the session threshold, and an end-of-process
//! close. An idle close stamps the end at the *last activity* time, not at
//! the moment idleness was noticed; the dead time in between belongs to no
//! session.

use chrono::{DateTime, Utc};

use crate::aggregate::{EventAggregator, SessionAggregate};
use crate::clock::NowTimes;
use crate::kv::KvStore;

/// Preference key holding the session threshold, sourced from the server.
pub const SESSION_THRESHOLD_PREF: &str = "sessionThresholdInSec";

pub const DEFAULT_SESSION_THRESHOLD_SECS: i64 = 900;

/// Hard floor; a hostile or corrupt preference cannot make every pause a
/// session boundary.
pub const MIN_SESSION_THRESHOLD_SECS: i64 = 60;

#[derive(Debug, Clone, Copy)]
pub struct SessionBoundaryPolicy {
    threshold_secs: i64,
    utc_offset_secs: i64,
}

impl SessionBoundaryPolicy {
    pub fn new(threshold_secs: i64, utc_offset_secs: i64) -> Self {
        Self {
            threshold_secs: threshold_secs.max(MIN_SESSION_THRESHOLD_SECS),
            utc_offset_secs,
        }
    }

    /// Reads the configured threshold from the kv store, clamped to the floor.
    pub fn from_preferences(kv: &KvStore, utc_offset_secs: i64) -> Self {
        let threshold = kv
            .get_i64(SESSION_THRESHOLD_PREF)
            .unwrap_or(DEFAULT_SESSION_THRESHOLD_SECS);
        Self::new(threshold, utc_offset_secs)
    }

    pub fn threshold_secs(&self) -> i64 {
        self.threshold_secs
    }

    /// Handles an idle or focus-loss signal. Closes the aggregate iff the
    /// gap since last activity has reached the threshold and there is data
    /// worth sending; the closed aggregate's end is the last-activity time.
    pub fn close_if_idle(
        &self,
        aggregator: &mut EventAggregator,
        now: DateTime<Utc>,
    ) -> Option<SessionAggregate> {
        let last_activity = aggregator.last_activity()?;
        if (now - last_activity).num_seconds() < self.threshold_secs {
            return None;
        }
        if !aggregator.has_data() {
            // Nothing worth sending; restart the window so stale dangling
            // records don't linger into the next session.
            aggregator.reset(NowTimes::at(now, self.utc_offset_secs));
            return None;
        }

        let end = NowTimes::at(last_activity, self.utc_offset_secs);
        let restart = NowTimes::at(now, self.utc_offset_secs);
        Some(aggregator.take_closed(end, restart))
    }

    /// End-of-process close: best-effort flush of whatever is open, stamped
    /// at the current time.
    pub fn close_for_shutdown(
        &self,
        aggregator: &mut EventAggregator,
        now: DateTime<Utc>,
    ) -> Option<SessionAggregate> {
        if !aggregator.has_data() {
            return None;
        }
        let end = NowTimes::at(now, self.utc_offset_secs);
        Some(aggregator.take_closed(end, end))
    }
}
