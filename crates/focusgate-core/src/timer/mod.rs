mod badge;
mod manager;
mod state;

pub use badge::{
    BadgeSurface, BadgeView, LONG_BREAK_COLOR, PAUSED_COLOR, SHORT_BREAK_COLOR, WORK_COLOR,
};
pub use manager::{TimerManager, TimerSurfaces};
pub use state::{
    format_time, Phase, SavedTimerState, SoundSettings, SoundSettingsPatch, TimerSettings,
    TimerSettingsPatch, TimerState, TimerStatus,
};
