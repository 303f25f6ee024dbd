//! Time sources for the engine.
//!
//! Session boundaries and scheduler cadences are all decided against an
//! injected [`Clock`] so they can be tested with a manually advanced time
//! source instead of sleeping.
//!
//! "Local" timestamps follow the collector's convention: local = UTC minus
//! the configured offset, carried as a second epoch value rather than a
//! timezone-aware type.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Paired wall-clock readings used to stamp session records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowTimes {
    pub utc: DateTime<Utc>,
    /// Epoch seconds shifted into the workstation's local offset.
    pub local_secs: i64,
}

impl NowTimes {
    pub fn at(utc: DateTime<Utc>, utc_offset_secs: i64) -> Self {
        Self {
            utc,
            local_secs: utc.timestamp() - utc_offset_secs,
        }
    }
}

/// Offset such that `local = utc_secs - offset` lands in the workstation's
/// local time, matching the collector's sign convention (positive west of
/// UTC).
pub fn system_utc_offset_secs() -> i64 {
    use chrono::Offset;
    -i64::from(chrono::Local::now().offset().fix().local_minus_utc())
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut guard = self.now.lock().unwrap();
        *guard += chrono::Duration::seconds(secs);
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_times_subtracts_offset() {
        let utc = Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap();
        let times = NowTimes::at(utc, 3600);
        assert_eq!(times.local_secs, utc.timestamp() - 3600);
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        clock.advance_secs(90);
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }
}
