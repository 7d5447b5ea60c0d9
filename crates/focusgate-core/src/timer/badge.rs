//! Toolbar badge.
//!
//! The host draws the badge; the core only decides what goes on it.

use serde::Serialize;

use super::state::{Phase, TimerStatus};

pub const WORK_COLOR: &str = "#F44336";
pub const SHORT_BREAK_COLOR: &str = "#4CAF50";
pub const LONG_BREAK_COLOR: &str = "#2196F3";
pub const PAUSED_COLOR: &str = "#9E9E9E";

/// Host badge surface.
pub trait BadgeSurface: Send {
    fn render(&mut self, phase: Phase, seconds_remaining: u32, status: TimerStatus);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeView {
    pub text: String,
    pub color: &'static str,
}

impl BadgeView {
    pub fn new(phase: Phase, seconds_remaining: u32, status: TimerStatus) -> Self {
        let color = match (status, phase) {
            (TimerStatus::Paused, _) => PAUSED_COLOR,
            (_, Phase::Work) => WORK_COLOR,
            (_, Phase::ShortBreak) => SHORT_BREAK_COLOR,
            (_, Phase::LongBreak) => LONG_BREAK_COLOR,
        };

        let text = if status == TimerStatus::Paused {
            "II".to_string()
        } else {
            let minutes = seconds_remaining / 60;
            let seconds = seconds_remaining % 60;
            let mut text = if minutes >= 10 {
                minutes.to_string()
            } else if minutes > 0 {
                format!("{minutes}:{seconds:02}")
            } else {
                format!(":{seconds:02}")
            };
            text.truncate(4);
            text
        };

        Self { text, color }
    }
}
