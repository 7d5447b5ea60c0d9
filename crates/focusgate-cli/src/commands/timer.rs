use clap::Subcommand;
use focusgate_core::audio::SoundEffect;
use focusgate_core::timer::{SoundSettingsPatch, TimerSettingsPatch};
use focusgate_core::{Config, Request};

use super::{ensure_no_daemon, open_background, print_json, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Print current timer state as JSON
    Status,
    /// Start or resume the countdown
    Start,
    /// Pause a running countdown
    Pause,
    /// Reset the current phase to its full duration
    Reset,
    /// End the current phase now
    Skip,
    /// Advance a running timer by whole seconds
    Tick {
        #[arg(long, default_value = "1")]
        count: u32,
    },
    /// Update timer settings
    Settings {
        /// Work duration in minutes
        #[arg(long)]
        work: Option<u32>,
        /// Short break duration in minutes
        #[arg(long)]
        short_break: Option<u32>,
        /// Long break duration in minutes
        #[arg(long)]
        long_break: Option<u32>,
        /// Work sessions per long break
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        auto_start_breaks: Option<bool>,
        #[arg(long)]
        auto_start_pomodoros: Option<bool>,
    },
    /// Choose completion sounds
    Sound {
        /// none, bell, bell_ding, door_close, timer or ticktock
        #[arg(long)]
        work_complete: Option<String>,
        #[arg(long)]
        break_complete: Option<String>,
    },
}

fn parse_effect(name: &str) -> Result<SoundEffect, Box<dyn std::error::Error>> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| format!("unknown sound '{name}'").into())
}

pub fn run(action: TimerAction, config: &Config) -> CliResult {
    if !matches!(action, TimerAction::Status) {
        ensure_no_daemon(config)?;
    }
    let mut background = open_background(config)?;

    match action {
        TimerAction::Status => {
            let response = background.handle(Request::GetState);
            print_json(&response)?;
            return Ok(());
        }
        TimerAction::Start => {
            background.handle(Request::Start);
        }
        TimerAction::Pause => {
            background.handle(Request::Pause);
        }
        TimerAction::Reset => {
            background.handle(Request::Reset);
        }
        TimerAction::Skip => {
            background.handle(Request::Skip);
        }
        TimerAction::Tick { count } => {
            for _ in 0..count {
                background.tick();
            }
        }
        TimerAction::Settings {
            work,
            short_break,
            long_break,
            interval,
            auto_start_breaks,
            auto_start_pomodoros,
        } => {
            let settings = TimerSettingsPatch {
                work_duration: work,
                short_break_duration: short_break,
                long_break_duration: long_break,
                long_break_interval: interval,
                auto_start_breaks,
                auto_start_pomodoros,
            };
            if settings.is_empty() {
                return Err("no settings given".into());
            }
            background.handle(Request::UpdateSettings { settings });
        }
        TimerAction::Sound {
            work_complete,
            break_complete,
        } => {
            let settings = SoundSettingsPatch {
                work_complete_sound: work_complete.as_deref().map(parse_effect).transpose()?,
                break_complete_sound: break_complete.as_deref().map(parse_effect).transpose()?,
            };
            if settings.is_empty() {
                return Err("no sound given".into());
            }
            background.handle(Request::UpdateSoundSettings { settings });
        }
    }

    background.flush();
    print_json(background.handler().timer().state())
}
