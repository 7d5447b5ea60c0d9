pub mod blocker;
pub mod config;
pub mod run;
pub mod stats;
pub mod timer;

use std::error::Error;
use std::sync::Arc;

use focusgate_core::blocker::{Tab, TabHost, TabId};
use chrono::Utc;
use focusgate_core::clock::SystemClock;
use focusgate_core::storage::DaemonLease;
use focusgate_core::surfaces::{LogAudio, LogBadge, LogNotifier};
use focusgate_core::timer::TimerSurfaces;
use focusgate_core::{Background, Config, Database};
use serde::Serialize;

pub type CliResult = Result<(), Box<dyn Error>>;

/// Tab host for one-shot commands, which see no browser.
pub struct NoTabs;

impl TabHost for NoTabs {
    fn open_tabs(&self) -> Vec<Tab> {
        Vec::new()
    }

    fn redirect(&mut self, tab: TabId, url: &str) {
        tracing::debug!(tab, url, "no tab host attached, redirect dropped");
    }
}

pub fn log_surfaces() -> TimerSurfaces {
    TimerSurfaces {
        audio: Box::new(LogAudio),
        badge: Box::new(LogBadge),
        notifier: Box::new(LogNotifier),
    }
}

/// Background restored from the data directory, for one-shot commands.
/// Call `flush` before returning so changes reach disk.
pub fn open_background(config: &Config) -> Result<Background, Box<dyn Error>> {
    let store = Arc::new(Database::open()?);
    let mut background = Background::new(
        config,
        store,
        Arc::new(SystemClock),
        log_surfaces(),
        Box::new(NoTabs),
    );
    background.startup();
    Ok(background)
}

/// Refuse to touch the timer while a `focusgate run` daemon owns the data
/// directory. Its next save would overwrite whatever we write.
pub fn ensure_no_daemon(config: &Config) -> CliResult {
    let db = Database::open()?;
    DaemonLease::ensure_unowned(&db, Utc::now(), config.daemon.lease_ttl())?;
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
