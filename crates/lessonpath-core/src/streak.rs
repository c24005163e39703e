//! Day-streak arithmetic and the clock it runs against.
//!
//! Days are compared by calendar date in the time zone of `now`; the time of
//! day never matters.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

/// Result of applying one qualifying activity to a streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub streak: u32,
    pub last_activity: DateTime<Utc>,
}

/// Compute the streak after an activity at `now`.
///
/// - no previous activity: streak starts at 1
/// - previous activity earlier the same day: nothing changes
/// - previous activity yesterday: streak grows by one
/// - anything else (a gap, or a date in the future): streak restarts at 1
pub fn update_streak<Tz: TimeZone>(
    current: u32,
    last_activity: Option<DateTime<Utc>>,
    now: &DateTime<Tz>,
) -> StreakUpdate {
    let now_utc = now.with_timezone(&Utc);

    let Some(last) = last_activity else {
        return StreakUpdate {
            streak: 1,
            last_activity: now_utc,
        };
    };

    let today = now.date_naive();
    let last_day = local_date(&last, now);

    if last_day == today {
        StreakUpdate {
            streak: current,
            last_activity: last,
        }
    } else if Some(last_day) == today.pred_opt() {
        StreakUpdate {
            streak: current.saturating_add(1),
            last_activity: now_utc,
        }
    } else {
        StreakUpdate {
            streak: 1,
            last_activity: now_utc,
        }
    }
}

/// Display state of a streak at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakStatus {
    /// No activity recorded yet
    None,
    /// Activity recorded today
    ActiveToday,
    /// Last activity was yesterday; completing a lesson today extends it
    AtRisk,
    /// The next completion starts a new streak
    Broken,
}

/// Classify a streak for display without changing it.
pub fn streak_status<Tz: TimeZone>(
    last_activity: Option<DateTime<Utc>>,
    now: &DateTime<Tz>,
) -> StreakStatus {
    let Some(last) = last_activity else {
        return StreakStatus::None;
    };

    let today = now.date_naive();
    let last_day = local_date(&last, now);
    if last_day == today {
        StreakStatus::ActiveToday
    } else if Some(last_day) == today.pred_opt() {
        StreakStatus::AtRisk
    } else {
        StreakStatus::Broken
    }
}

fn local_date<Tz: TimeZone>(instant: &DateTime<Utc>, reference: &DateTime<Tz>) -> NaiveDate {
    instant.with_timezone(&reference.timezone()).date_naive()
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Wall clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    #[must_use]
    pub const fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by whole days.
    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
