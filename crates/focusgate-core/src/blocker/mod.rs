//! Site blocker.
//!
//! [`is_active`] decides whether blocking applies right now and with which
//! patterns. [`SiteBlocker`] turns that verdict into redirects for
//! navigations and already-open tabs.

mod enforcer;
mod policy;

pub use enforcer::{edit_settings, Navigation, Redirect, SiteBlocker, Tab, TabHost, TabId};
pub use policy::{
    host_matches, is_active, normalize_domain, parse_weekday, BlockerSettings, BlockingMode,
    BlockingVerdict, TimeRange, WorkSchedule, DEFAULT_BLOCKED_SITES,
};
