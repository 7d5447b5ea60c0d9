use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{Phase, TimerState, TimerStatus};

/// Every state change in the system produces an Event.
///
/// The timer returns the transition variants from its commands; the message
/// handler turns any of them into a `StateUpdate` broadcast and forwards the
/// ones contexts care about directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    TimerStarted {
        phase: Phase,
        resumed: bool,
        time_remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        time_remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerReset {
        phase: Phase,
        time_remaining_secs: u32,
        at: DateTime<Utc>,
    },
    TimerSkipped {
        from: Phase,
        to: Phase,
        status: TimerStatus,
        at: DateTime<Utc>,
    },
    TimerTicked {
        phase: Phase,
        time_remaining_secs: u32,
    },
    PhaseCompleted {
        completed: Phase,
        next: Phase,
        completed_cycles: u32,
        auto_started: bool,
        at: DateTime<Utc>,
    },
    SettingsUpdated {
        at: DateTime<Utc>,
    },
    /// Full snapshot pushed to every listening context.
    StateUpdate {
        state: TimerState,
    },
    TabBlocked {
        tab_id: u32,
        url: String,
        pattern: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Transition events are also worth forwarding verbatim to contexts.
    /// Ticks and settings changes are only visible through `StateUpdate`.
    pub fn is_forwarded(&self) -> bool {
        matches!(
            self,
            Event::PhaseCompleted { .. } | Event::TabBlocked { .. }
        )
    }
}
