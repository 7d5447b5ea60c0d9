//! Per-day aggregate counters.
//!
//! [`StatsManager`] keeps today's work-seconds and completed pomodoros.
//! Rollover is lazy: [`StatsManager::ensure_today`] runs at the top of every
//! mutation and of the periodic check, and swaps in a zeroed record when the
//! stored date is not today. There is no dedicated midnight alarm.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::WallClock;

/// Date key format for [`DailyStats::date`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    /// Local calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub work_seconds: u64,
    pub pomodoros_completed: u32,
}

impl DailyStats {
    pub fn empty(date: String) -> Self {
        Self {
            date,
            work_seconds: 0,
            pomodoros_completed: 0,
        }
    }
}

pub struct StatsManager {
    stats: DailyStats,
    clock: Arc<dyn WallClock>,
}

impl StatsManager {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        let today = today_key(clock.as_ref());
        Self {
            stats: DailyStats::empty(today),
            clock,
        }
    }

    /// Adopt a persisted record if it belongs to today, else start fresh.
    pub fn initialize(&mut self, saved: Option<DailyStats>) {
        let today = today_key(self.clock.as_ref());
        self.stats = match saved {
            Some(saved) if saved.date == today => saved,
            _ => DailyStats::empty(today),
        };
    }

    /// Current counters, rolled over first if the day changed.
    pub fn snapshot(&mut self) -> DailyStats {
        self.ensure_today();
        self.stats.clone()
    }

    pub fn add_work_second(&mut self) {
        self.ensure_today();
        self.stats.work_seconds += 1;
    }

    pub fn add_completed_pomodoro(&mut self) {
        self.ensure_today();
        self.stats.pomodoros_completed += 1;
    }

    /// Periodic check. Returns `true` when a rollover happened.
    pub fn check_date_change(&mut self) -> bool {
        self.ensure_today()
    }

    /// Reset counters if the stored day is stale. Returns `true` on rollover.
    pub fn ensure_today(&mut self) -> bool {
        let today = today_key(self.clock.as_ref());
        if today == self.stats.date {
            return false;
        }
        tracing::info!(from = %self.stats.date, to = %today, "day changed, resetting daily stats");
        self.stats = DailyStats::empty(today);
        true
    }
}

fn today_key(clock: &dyn WallClock) -> String {
    clock.today().format(DATE_FORMAT).to_string()
}
