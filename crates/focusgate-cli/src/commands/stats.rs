use clap::Subcommand;
use focusgate_core::{Config, Request, Response};

use super::{open_background, print_json, CliResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's work seconds and completed pomodoros
    Today,
}

pub fn run(action: StatsAction, config: &Config) -> CliResult {
    let mut background = open_background(config)?;

    match action {
        StatsAction::Today => match background.handle(Request::GetState) {
            Response::State(state) => print_json(&state.daily_stats),
            Response::Ack { .. } => Err("timer did not report its state".into()),
        },
    }
}
