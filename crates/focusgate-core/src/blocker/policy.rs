//! Blocking policy: when blocking is active and which sites it covers.
//!
//! Evaluation is a pure function of the persisted [`BlockerSettings`], the
//! live timer snapshot and the local time. Only the selected mode's
//! settings are consulted.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::timer::TimerState;

pub const DEFAULT_BLOCKED_SITES: [&str; 10] = [
    "facebook.com",
    "reddit.com",
    "xiaohongshu.com",
    "bilibili.com",
    "youtube.com",
    "douyin.com",
    "tiktok.com",
    "instagram.com",
    "x.com",
    "weibo.com",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockingMode {
    Pomodoro,
    Schedule,
    /// Any mode name this version does not understand. Never blocks.
    #[serde(other)]
    Unknown,
}

impl BlockingMode {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        match s.to_ascii_lowercase().as_str() {
            "pomodoro" => Ok(BlockingMode::Pomodoro),
            "schedule" => Ok(BlockingMode::Schedule),
            _ => Err(ValidationError::InvalidValue {
                field: "mode".into(),
                message: format!("'{s}' is not one of pomodoro, schedule"),
            }),
        }
    }
}

fn unknown_mode() -> BlockingMode {
    BlockingMode::Unknown
}

/// A `HHMM`-`HHMM` window, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

impl TimeRange {
    pub fn new(start: &str, end: &str) -> Result<Self, ValidationError> {
        validate_hhmm(start)?;
        validate_hhmm(end)?;
        if start > end {
            return Err(ValidationError::InvalidTimeRange {
                input: format!("{start}-{end}"),
            });
        }
        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Parse `"0800-1200"`.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let (start, end) = input
            .trim()
            .split_once('-')
            .ok_or_else(|| ValidationError::InvalidTimeRange {
                input: input.to_string(),
            })?;
        Self::new(start.trim(), end.trim()).map_err(|e| match e {
            ValidationError::InvalidTime(_) => ValidationError::InvalidTimeRange {
                input: input.to_string(),
            },
            other => other,
        })
    }

    /// Fixed-width strings compare in clock order.
    pub fn contains(&self, hhmm: &str) -> bool {
        hhmm >= self.start.as_str() && hhmm <= self.end.as_str()
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

fn validate_hhmm(s: &str) -> Result<(), ValidationError> {
    let invalid = || ValidationError::InvalidTime(s.to_string());
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: u32 = s[..2].parse().map_err(|_| invalid())?;
    let minutes: u32 = s[2..].parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(())
}

/// Weekday index, 0 = Sunday. Accepts digits or English short names.
pub fn parse_weekday(input: &str) -> Result<u8, ValidationError> {
    let input = input.trim().to_ascii_lowercase();
    let day = match input.as_str() {
        "sun" | "sunday" => 0,
        "mon" | "monday" => 1,
        "tue" | "tuesday" => 2,
        "wed" | "wednesday" => 3,
        "thu" | "thursday" => 4,
        "fri" | "friday" => 5,
        "sat" | "saturday" => 6,
        digits => digits.parse::<u8>().map_err(|_| ValidationError::InvalidValue {
            field: "day".into(),
            message: format!("'{digits}' is not a weekday"),
        })?,
    };
    if day > 6 {
        return Err(ValidationError::InvalidWeekday(day));
    }
    Ok(day)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSchedule {
    #[serde(default)]
    pub days: Vec<u8>,
    #[serde(default)]
    pub time_ranges: Vec<TimeRange>,
}

impl Default for WorkSchedule {
    fn default() -> Self {
        Self {
            days: vec![1, 2, 3, 4, 5],
            time_ranges: vec![
                TimeRange {
                    start: "0800".into(),
                    end: "1200".into(),
                },
                TimeRange {
                    start: "1330".into(),
                    end: "1730".into(),
                },
            ],
        }
    }
}

impl WorkSchedule {
    /// Both lists must be non-empty for the schedule to ever open.
    pub fn is_open(&self, weekday: u8, hhmm: &str) -> bool {
        !self.days.is_empty()
            && !self.time_ranges.is_empty()
            && self.days.contains(&weekday)
            && self.time_ranges.iter().any(|range| range.contains(hhmm))
    }
}

/// Persisted blocker profile (`blockerSettings` in the sync namespace).
///
/// Missing fields deserialize to the fail-safe value: no mode, both
/// switches off, no schedule, no sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockerSettings {
    #[serde(default = "unknown_mode")]
    pub mode: BlockingMode,
    #[serde(default)]
    pub enabled_during_work: bool,
    #[serde(default)]
    pub schedule_enabled: bool,
    #[serde(default)]
    pub work_schedule: Option<WorkSchedule>,
    #[serde(default)]
    pub blocked_sites: Vec<String>,
}

impl Default for BlockerSettings {
    fn default() -> Self {
        Self {
            mode: BlockingMode::Pomodoro,
            enabled_during_work: true,
            schedule_enabled: true,
            work_schedule: Some(WorkSchedule::default()),
            blocked_sites: DEFAULT_BLOCKED_SITES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl BlockerSettings {
    /// Add a site after normalizing it. Returns `false` if already listed.
    pub fn add_site(&mut self, input: &str) -> Result<bool, ValidationError> {
        let domain = normalize_domain(input)?;
        if self.blocked_sites.contains(&domain) {
            return Ok(false);
        }
        self.blocked_sites.push(domain);
        Ok(true)
    }

    /// Remove a site. Returns `false` if it was not listed.
    pub fn remove_site(&mut self, input: &str) -> bool {
        let Ok(domain) = normalize_domain(input) else {
            return false;
        };
        let before = self.blocked_sites.len();
        self.blocked_sites.retain(|site| *site != domain);
        self.blocked_sites.len() != before
    }

    pub fn set_mode(&mut self, mode: BlockingMode) {
        self.mode = mode;
    }

    pub fn set_enabled_during_work(&mut self, enabled: bool) {
        self.enabled_during_work = enabled;
    }

    pub fn set_schedule_enabled(&mut self, enabled: bool) {
        self.schedule_enabled = enabled;
    }

    /// Replace the work schedule. Days are deduplicated and sorted.
    pub fn set_schedule(
        &mut self,
        days: Vec<u8>,
        time_ranges: Vec<TimeRange>,
    ) -> Result<(), ValidationError> {
        if let Some(&bad) = days.iter().find(|&&d| d > 6) {
            return Err(ValidationError::InvalidWeekday(bad));
        }
        let mut days = days;
        days.sort_unstable();
        days.dedup();
        self.work_schedule = Some(WorkSchedule { days, time_ranges });
        Ok(())
    }
}

/// Reduce user input to a bare lowercase host pattern.
///
/// `"https://www.YouTube.com/watch?v=1"` becomes `"youtube.com"`.
pub fn normalize_domain(input: &str) -> Result<String, ValidationError> {
    let mut domain = input.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
            break;
        }
    }
    if let Some(rest) = domain.strip_prefix("www.") {
        domain = rest.to_string();
    }
    if let Some(end) = domain.find(['/', '?', '#']) {
        domain.truncate(end);
    }
    if domain.is_empty() {
        return Err(ValidationError::EmptyDomain);
    }
    Ok(domain)
}

/// Exact host or any subdomain of it. Empty patterns never match.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    host == pattern
        || (host.len() > pattern.len()
            && host.ends_with(pattern)
            && host.as_bytes()[host.len() - pattern.len() - 1] == b'.')
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingVerdict {
    pub active: bool,
    /// The blocklist when active, empty otherwise.
    pub effective_list: Vec<String>,
}

impl BlockingVerdict {
    pub fn inactive() -> Self {
        Self::default()
    }

    /// First pattern in the effective list that covers `host`.
    pub fn matching(&self, host: &str) -> Option<&str> {
        self.effective_list
            .iter()
            .map(String::as_str)
            .find(|pattern| host_matches(host, pattern))
    }
}

pub fn is_active(
    settings: &BlockerSettings,
    timer: Option<&TimerState>,
    now: NaiveDateTime,
) -> BlockingVerdict {
    if settings.blocked_sites.is_empty() {
        tracing::debug!("blocklist empty, blocking inactive");
        return BlockingVerdict::inactive();
    }

    let active = match settings.mode {
        BlockingMode::Pomodoro => {
            settings.enabled_during_work && timer.is_some_and(TimerState::is_working)
        }
        BlockingMode::Schedule => {
            let weekday = now.weekday().num_days_from_sunday() as u8;
            let hhmm = now.format("%H%M").to_string();
            settings.schedule_enabled
                && settings
                    .work_schedule
                    .as_ref()
                    .is_some_and(|schedule| schedule.is_open(weekday, &hhmm))
        }
        BlockingMode::Unknown => {
            tracing::debug!("unknown blocking mode, blocking inactive");
            false
        }
    };

    tracing::debug!(mode = ?settings.mode, active, sites = settings.blocked_sites.len(), "blocking evaluated");
    if active {
        BlockingVerdict {
            active: true,
            effective_list: settings.blocked_sites.clone(),
        }
    } else {
        BlockingVerdict::inactive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::DailyStats;
    use crate::timer::{Phase, TimerStatus};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn timer(phase: Phase, status: TimerStatus) -> TimerState {
        let mut state = TimerState::new(DailyStats::empty("2026-03-02".into()));
        state.phase = phase;
        state.status = status;
        state
    }

    fn schedule_settings() -> BlockerSettings {
        BlockerSettings {
            mode: BlockingMode::Schedule,
            blocked_sites: vec!["youtube.com".into()],
            ..BlockerSettings::default()
        }
    }

    #[test]
    fn host_match_is_suffix_on_label_boundary() {
        assert!(host_matches("youtube.com", "youtube.com"));
        assert!(host_matches("m.youtube.com", "youtube.com"));
        assert!(!host_matches("notyoutube.com", "youtube.com"));
        assert!(!host_matches("youtube.com.evil.io", "youtube.com"));
        assert!(!host_matches("youtube.com", ""));
    }

    #[test]
    fn pomodoro_mode_follows_timer() {
        let settings = BlockerSettings {
            blocked_sites: vec!["reddit.com".into()],
            ..BlockerSettings::default()
        };
        let now = at(2026, 3, 1, 3, 0);

        let running = timer(Phase::Work, TimerStatus::Running);
        let verdict = is_active(&settings, Some(&running), now);
        assert!(verdict.active);
        assert_eq!(verdict.matching("old.reddit.com"), Some("reddit.com"));

        let paused = timer(Phase::Work, TimerStatus::Paused);
        assert!(!is_active(&settings, Some(&paused), now).active);
        let on_break = timer(Phase::ShortBreak, TimerStatus::Running);
        assert!(!is_active(&settings, Some(&on_break), now).active);
        assert!(!is_active(&settings, None, now).active);
    }

    #[test]
    fn pomodoro_mode_ignores_schedule() {
        let mut settings = BlockerSettings::default();
        settings.set_schedule_enabled(true);
        // Monday 09:00 is inside the default schedule, but the timer is idle.
        let idle = timer(Phase::Work, TimerStatus::Idle);
        assert!(!is_active(&settings, Some(&idle), at(2026, 3, 2, 9, 0)).active);
    }

    #[test]
    fn schedule_mode_checks_day_and_range() {
        let settings = schedule_settings();
        // 2026-03-02 is a Monday.
        assert!(is_active(&settings, None, at(2026, 3, 2, 8, 0)).active);
        assert!(is_active(&settings, None, at(2026, 3, 2, 12, 0)).active);
        assert!(!is_active(&settings, None, at(2026, 3, 2, 12, 1)).active);
        assert!(is_active(&settings, None, at(2026, 3, 2, 17, 30)).active);
        // Sunday.
        assert!(!is_active(&settings, None, at(2026, 3, 1, 9, 0)).active);
    }

    #[test]
    fn schedule_mode_ignores_timer() {
        let settings = schedule_settings();
        let running = timer(Phase::Work, TimerStatus::Running);
        assert!(!is_active(&settings, Some(&running), at(2026, 3, 2, 20, 0)).active);
        let idle = timer(Phase::Work, TimerStatus::Idle);
        assert!(is_active(&settings, Some(&idle), at(2026, 3, 2, 9, 0)).active);
    }

    #[test]
    fn incomplete_schedule_is_inactive() {
        let mut settings = schedule_settings();
        settings.work_schedule = Some(WorkSchedule {
            days: vec![1],
            time_ranges: vec![],
        });
        assert!(!is_active(&settings, None, at(2026, 3, 2, 9, 0)).active);
        settings.work_schedule = None;
        assert!(!is_active(&settings, None, at(2026, 3, 2, 9, 0)).active);
    }

    #[test]
    fn unknown_mode_and_missing_fields_fail_safe() {
        let settings: BlockerSettings = serde_json::from_str(
            r#"{"mode": "focus", "enabledDuringWork": true, "blockedSites": ["x.com"]}"#,
        )
        .unwrap();
        assert_eq!(settings.mode, BlockingMode::Unknown);
        let running = timer(Phase::Work, TimerStatus::Running);
        assert!(!is_active(&settings, Some(&running), at(2026, 3, 2, 9, 0)).active);

        let bare: BlockerSettings = serde_json::from_str(r#"{"mode": "pomodoro"}"#).unwrap();
        assert!(!bare.enabled_during_work);
        assert!(bare.blocked_sites.is_empty());
    }

    #[test]
    fn add_site_normalizes_and_dedupes() {
        let mut settings = BlockerSettings {
            blocked_sites: vec![],
            ..BlockerSettings::default()
        };
        assert_eq!(settings.add_site("https://www.YouTube.com/watch?v=1"), Ok(true));
        assert_eq!(settings.add_site("youtube.com"), Ok(false));
        assert_eq!(settings.add_site("   "), Err(ValidationError::EmptyDomain));
        assert_eq!(settings.blocked_sites, vec!["youtube.com"]);

        assert!(settings.remove_site("http://youtube.com/"));
        assert!(!settings.remove_site("youtube.com"));
    }

    #[test]
    fn time_range_parse_validates() {
        let range = TimeRange::parse("0800-1200").unwrap();
        assert_eq!(range.to_string(), "0800-1200");
        assert!(range.contains("0800") && range.contains("1200"));
        assert!(!range.contains("1201"));

        assert!(TimeRange::parse("800-1200").is_err());
        assert!(TimeRange::parse("2500-2600").is_err());
        assert!(TimeRange::parse("1200-0800").is_err());
        assert!(TimeRange::parse("0800").is_err());
    }

    #[test]
    fn weekdays_are_validated() {
        assert_eq!(parse_weekday("mon"), Ok(1));
        assert_eq!(parse_weekday("0"), Ok(0));
        assert_eq!(parse_weekday("7"), Err(ValidationError::InvalidWeekday(7)));

        let mut settings = BlockerSettings::default();
        assert!(settings.set_schedule(vec![9], vec![]).is_err());
        settings.set_schedule(vec![5, 1, 1], vec![]).unwrap();
        assert_eq!(settings.work_schedule.unwrap().days, vec![1, 5]);
    }
}
