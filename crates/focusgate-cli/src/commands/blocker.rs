use clap::Subcommand;
use focusgate_core::blocker::{
    edit_settings, normalize_domain, parse_weekday, BlockerSettings, BlockingMode, Navigation,
    TimeRange,
};
use focusgate_core::{Config, Database, ValidationError};
use serde::Serialize;

use super::{open_background, print_json, CliResult};

#[derive(Subcommand)]
pub enum BlockerAction {
    /// Print blocker settings and whether blocking is active now
    Show,
    /// Add a site to the blocklist
    Add {
        /// Domain or URL, e.g. "youtube.com" or "https://www.reddit.com/r/all"
        site: String,
    },
    /// Remove a site from the blocklist
    Remove { site: String },
    /// Select the blocking mode (pomodoro or schedule)
    Mode { mode: String },
    /// Enable or disable blocking during work sessions
    EnableWork {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Enable or disable schedule-based blocking
    EnableSchedule {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Replace the weekly blocking schedule
    Schedule {
        /// Comma-separated weekdays, 0 = Sunday or names ("mon,tue")
        #[arg(long, value_delimiter = ',')]
        days: Vec<String>,
        /// Time range HHMM-HHMM; repeat for several ranges
        #[arg(long = "range")]
        ranges: Vec<String>,
    },
    /// Report whether a top-level navigation to URL would be blocked now
    Check { url: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    url: String,
    blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShowReport {
    settings: BlockerSettings,
    stored: bool,
    active: bool,
}

/// Apply `change` to the stored blocker settings and print the result.
fn edit<F>(change: F) -> CliResult
where
    F: FnOnce(&mut BlockerSettings) -> Result<(), ValidationError>,
{
    let db = Database::open()?;
    let settings = edit_settings(&db, change)?;
    print_json(&settings)
}

pub fn run(action: BlockerAction, config: &Config) -> CliResult {
    match action {
        BlockerAction::Show => {
            let background = open_background(config)?;
            let stored = background.blocker().settings();
            let active = background
                .blocker()
                .verdict(Some(background.handler().timer().state()))
                .active;
            print_json(&ShowReport {
                stored: stored.is_some(),
                settings: stored.unwrap_or_default(),
                active,
            })
        }
        BlockerAction::Check { url } => {
            let background = open_background(config)?;
            let navigation = Navigation {
                tab_id: 0,
                frame_id: 0,
                url: url.clone(),
            };
            let redirect = background
                .blocker()
                .on_before_navigate(&navigation, Some(background.handler().timer().state()));
            print_json(&CheckReport {
                url,
                blocked: redirect.is_some(),
                pattern: redirect.as_ref().map(|r| r.pattern.clone()),
                redirect: redirect.map(|r| r.url),
            })
        }
        BlockerAction::Add { site } => edit(|settings| {
            if !settings.add_site(&site)? {
                eprintln!("{} is already blocked", normalize_domain(&site)?);
            }
            Ok(())
        }),
        BlockerAction::Remove { site } => edit(|settings| {
            if settings.remove_site(&site) {
                Ok(())
            } else {
                Err(ValidationError::InvalidValue {
                    field: "site".into(),
                    message: format!("{site} is not in the blocklist"),
                })
            }
        }),
        BlockerAction::Mode { mode } => edit(|settings| {
            settings.set_mode(BlockingMode::parse(&mode)?);
            Ok(())
        }),
        BlockerAction::EnableWork { enabled } => edit(|settings| {
            settings.set_enabled_during_work(enabled);
            Ok(())
        }),
        BlockerAction::EnableSchedule { enabled } => edit(|settings| {
            settings.set_schedule_enabled(enabled);
            Ok(())
        }),
        BlockerAction::Schedule { days, ranges } => {
            let days = days
                .iter()
                .map(|d| parse_weekday(d))
                .collect::<Result<Vec<_>, _>>()?;
            let ranges = ranges
                .iter()
                .map(|r| TimeRange::parse(r))
                .collect::<Result<Vec<_>, _>>()?;
            edit(|settings| settings.set_schedule(days, ranges))
        }
    }
}
