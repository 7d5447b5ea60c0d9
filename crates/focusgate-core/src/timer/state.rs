use serde::{Deserialize, Serialize};

use crate::audio::SoundEffect;
use crate::stats::DailyStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Work)
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Work
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Idle,
    Running,
    Paused,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Idle
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    /// Minutes.
    pub work_duration: u32,
    /// Minutes.
    pub short_break_duration: u32,
    /// Minutes.
    pub long_break_duration: u32,
    /// Completed work phases per long break.
    pub long_break_interval: u32,
    pub auto_start_breaks: bool,
    pub auto_start_pomodoros: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            work_duration: 25,
            short_break_duration: 5,
            long_break_duration: 15,
            long_break_interval: 4,
            auto_start_breaks: true,
            auto_start_pomodoros: false,
        }
    }
}

impl TimerSettings {
    pub fn duration_secs(&self, phase: Phase) -> u32 {
        let minutes = match phase {
            Phase::Work => self.work_duration,
            Phase::ShortBreak => self.short_break_duration,
            Phase::LongBreak => self.long_break_duration,
        };
        minutes.saturating_mul(60)
    }

    /// Break that follows the `cycle`-th completed work phase.
    ///
    /// An interval of zero is treated as one.
    pub fn break_after(&self, cycle: u32) -> Phase {
        if cycle % self.long_break_interval.max(1) == 0 {
            Phase::LongBreak
        } else {
            Phase::ShortBreak
        }
    }

    pub fn apply(&mut self, patch: &TimerSettingsPatch) {
        if let Some(v) = patch.work_duration {
            self.work_duration = v;
        }
        if let Some(v) = patch.short_break_duration {
            self.short_break_duration = v;
        }
        if let Some(v) = patch.long_break_duration {
            self.long_break_duration = v;
        }
        if let Some(v) = patch.long_break_interval {
            self.long_break_interval = v;
        }
        if let Some(v) = patch.auto_start_breaks {
            self.auto_start_breaks = v;
        }
        if let Some(v) = patch.auto_start_pomodoros {
            self.auto_start_pomodoros = v;
        }
    }
}

/// Partial timer settings; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_break_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_breaks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_start_pomodoros: Option<bool>,
}

impl TimerSettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundSettings {
    pub work_complete_sound: SoundEffect,
    pub break_complete_sound: SoundEffect,
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            work_complete_sound: SoundEffect::BellDing,
            break_complete_sound: SoundEffect::Timer,
        }
    }
}

impl SoundSettings {
    pub fn apply(&mut self, patch: &SoundSettingsPatch) {
        if let Some(v) = patch.work_complete_sound {
            self.work_complete_sound = v;
        }
        if let Some(v) = patch.break_complete_sound {
            self.break_complete_sound = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundSettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_complete_sound: Option<SoundEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_complete_sound: Option<SoundEffect>,
}

impl SoundSettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Full timer snapshot, as broadcast to contexts and persisted locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub status: TimerStatus,
    pub time_remaining_secs: u32,
    pub display_time: String,
    pub completed_cycles: u32,
    pub settings: TimerSettings,
    pub sound_settings: SoundSettings,
    pub daily_stats: DailyStats,
}

impl TimerState {
    pub fn new(daily_stats: DailyStats) -> Self {
        let settings = TimerSettings::default();
        let time_remaining_secs = settings.duration_secs(Phase::Work);
        Self {
            phase: Phase::Work,
            status: TimerStatus::Idle,
            time_remaining_secs,
            display_time: format_time(time_remaining_secs),
            completed_cycles: 0,
            settings,
            sound_settings: SoundSettings::default(),
            daily_stats,
        }
    }

    /// Whether the pomodoro blocking condition holds for this snapshot.
    pub fn is_working(&self) -> bool {
        self.phase == Phase::Work && self.status == TimerStatus::Running
    }
}

/// Persisted snapshot as read back at startup. Every field is optional so
/// snapshots written by older versions still restore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedTimerState {
    #[serde(default)]
    pub phase: Option<Phase>,
    #[serde(default)]
    pub status: Option<TimerStatus>,
    #[serde(default)]
    pub time_remaining_secs: Option<u32>,
    #[serde(default)]
    pub completed_cycles: Option<u32>,
    #[serde(default)]
    pub settings: Option<TimerSettings>,
    #[serde(default)]
    pub sound_settings: Option<SoundSettings>,
    #[serde(default)]
    pub daily_stats: Option<DailyStats>,
}

impl From<TimerState> for SavedTimerState {
    fn from(state: TimerState) -> Self {
        Self {
            phase: Some(state.phase),
            status: Some(state.status),
            time_remaining_secs: Some(state.time_remaining_secs),
            completed_cycles: Some(state.completed_cycles),
            settings: Some(state.settings),
            sound_settings: Some(state.sound_settings),
            daily_stats: Some(state.daily_stats),
        }
    }
}

/// `MM:SS` rendering used by the popup.
pub fn format_time(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
