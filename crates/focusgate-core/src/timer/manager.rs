//! Pomodoro state machine.
//!
//! The manager owns the authoritative [`TimerState`]. It does not run a
//! clock of its own: the background service calls [`TimerManager::tick`]
//! once per second while [`TimerManager::is_armed`] reports `true`.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> Paused -> Running
//!          |
//!          +-- remaining hits 0 --> next phase (Running if auto-start, else Idle)
//! ```
//!
//! Commands return `Some(Event)` when they changed something and `None`
//! when they were a no-op for the current status.

use std::sync::Arc;

use chrono::Utc;

use super::badge::BadgeSurface;
use super::state::{
    format_time, Phase, SavedTimerState, SoundSettingsPatch, TimerSettingsPatch, TimerState,
    TimerStatus,
};
use crate::audio::{AudioOutput, SoundController};
use crate::clock::WallClock;
use crate::events::Event;
use crate::notify::{completion_message, Language, Notifier};
use crate::stats::StatsManager;
use crate::storage::DurableStore;

/// Host surfaces the timer drives.
pub struct TimerSurfaces {
    pub audio: Box<dyn AudioOutput>,
    pub badge: Box<dyn BadgeSurface>,
    pub notifier: Box<dyn Notifier>,
}

pub struct TimerManager {
    state: TimerState,
    stats: StatsManager,
    sound: SoundController,
    badge: Box<dyn BadgeSurface>,
    notifier: Box<dyn Notifier>,
    store: Arc<dyn DurableStore>,
    /// Set exactly while the status is `Running`.
    armed: bool,
}

impl TimerManager {
    pub fn new(
        surfaces: TimerSurfaces,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        let mut stats = StatsManager::new(clock);
        let state = TimerState::new(stats.snapshot());
        Self {
            state,
            stats,
            sound: SoundController::new(surfaces.audio, store.clone()),
            badge: surfaces.badge,
            notifier: surfaces.notifier,
            store,
            armed: false,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    /// Whether the one-second tick source should be running.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// `(phase, status)` pair; the blocker re-sweeps whenever it changes.
    pub fn activity(&self) -> (Phase, TimerStatus) {
        (self.state.phase, self.state.status)
    }

    /// Snapshot for a `GET_STATE` request. Refreshes the badge and rolls
    /// daily stats over if the day changed.
    pub fn get_state(&mut self) -> TimerState {
        self.state.daily_stats = self.stats.snapshot();
        self.refresh_badge();
        self.state.clone()
    }

    pub fn sound_mut(&mut self) -> &mut SoundController {
        &mut self.sound
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&mut self) -> Option<Event> {
        if self.state.status == TimerStatus::Running {
            tracing::debug!("start ignored, timer already running");
            return None;
        }
        let resumed = self.state.status == TimerStatus::Paused;

        self.sound.stop_all();
        if !resumed
            && self.state.phase == Phase::Work
            && !self.state.settings.auto_start_pomodoros
        {
            // Manual start of a fresh work phase gets an audible cue.
            self.sound
                .play(self.state.sound_settings.break_complete_sound);
        }

        self.arm();
        self.refresh_badge();
        tracing::info!(phase = ?self.state.phase, resumed, "timer started");
        Some(Event::TimerStarted {
            phase: self.state.phase,
            resumed,
            time_remaining_secs: self.state.time_remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn pause(&mut self) -> Option<Event> {
        if self.state.status != TimerStatus::Running {
            return None;
        }
        self.disarm(TimerStatus::Paused);
        self.sound.stop_all();
        self.refresh_badge();
        tracing::info!(remaining = self.state.time_remaining_secs, "timer paused");
        Some(Event::TimerPaused {
            phase: self.state.phase,
            time_remaining_secs: self.state.time_remaining_secs,
            at: Utc::now(),
        })
    }

    pub fn reset(&mut self) -> Option<Event> {
        self.disarm(TimerStatus::Idle);
        self.sound.stop_all();
        self.load_phase_duration();
        self.refresh_badge();
        Some(Event::TimerReset {
            phase: self.state.phase,
            time_remaining_secs: self.state.time_remaining_secs,
            at: Utc::now(),
        })
    }

    /// End the current phase early. Skipping a work phase counts it as
    /// completed.
    pub fn skip(&mut self) -> Option<Event> {
        let from = self.state.phase;
        let prior = self.state.status;

        let auto_start = if from == Phase::Work {
            self.count_completed_pomodoro();
            self.state.phase = self.state.settings.break_after(self.state.completed_cycles);
            self.state.settings.auto_start_breaks
        } else {
            self.state.phase = Phase::Work;
            self.state.settings.auto_start_pomodoros
        };

        self.sound.stop_all();
        self.load_phase_duration();
        if auto_start || prior == TimerStatus::Running {
            self.arm();
        } else {
            self.disarm(prior);
        }
        self.refresh_badge();

        tracing::info!(?from, to = ?self.state.phase, status = ?self.state.status, "phase skipped");
        Some(Event::TimerSkipped {
            from,
            to: self.state.phase,
            status: self.state.status,
            at: Utc::now(),
        })
    }

    /// One second of countdown. Ignored unless running.
    pub fn tick(&mut self) -> Option<Event> {
        if self.state.status != TimerStatus::Running {
            return None;
        }

        self.state.time_remaining_secs = self.state.time_remaining_secs.saturating_sub(1);
        self.state.display_time = format_time(self.state.time_remaining_secs);
        if self.state.phase == Phase::Work {
            self.stats.add_work_second();
            self.state.daily_stats = self.stats.snapshot();
        }

        if self.state.time_remaining_secs == 0 {
            return Some(self.complete_phase());
        }

        self.refresh_badge();
        Some(Event::TimerTicked {
            phase: self.state.phase,
            time_remaining_secs: self.state.time_remaining_secs,
        })
    }

    pub fn update_settings(&mut self, patch: &TimerSettingsPatch) -> Option<Event> {
        self.state.settings.apply(patch);
        if self.state.status == TimerStatus::Idle {
            self.sound.stop_all();
            self.load_phase_duration();
            self.refresh_badge();
        }
        tracing::debug!(?patch, "timer settings updated");
        Some(Event::SettingsUpdated { at: Utc::now() })
    }

    pub fn update_sound_settings(&mut self, patch: &SoundSettingsPatch) -> Option<Event> {
        self.state.sound_settings.apply(patch);
        Some(Event::SettingsUpdated { at: Utc::now() })
    }

    /// Merge a persisted snapshot over the current state.
    ///
    /// Safe to call more than once: the result depends only on `saved` and
    /// the current day.
    pub fn restore(&mut self, saved: SavedTimerState) {
        if let Some(phase) = saved.phase {
            self.state.phase = phase;
        }
        if let Some(status) = saved.status {
            self.state.status = status;
        }
        if let Some(settings) = saved.settings {
            self.state.settings = settings;
        }
        if let Some(sound_settings) = saved.sound_settings {
            self.state.sound_settings = sound_settings;
        }
        if let Some(cycles) = saved.completed_cycles {
            self.state.completed_cycles = cycles;
        }
        match saved.time_remaining_secs {
            Some(secs) => self.state.time_remaining_secs = secs,
            None => {
                self.state.time_remaining_secs =
                    self.state.settings.duration_secs(self.state.phase)
            }
        }
        self.state.display_time = format_time(self.state.time_remaining_secs);

        self.stats.initialize(saved.daily_stats);
        self.state.daily_stats = self.stats.snapshot();

        self.armed = self.state.status == TimerStatus::Running;
        self.refresh_badge();
        tracing::info!(
            phase = ?self.state.phase,
            status = ?self.state.status,
            remaining = self.state.time_remaining_secs,
            "timer state restored"
        );
    }

    /// Periodic daily-stats check. Returns `true` when the day rolled over.
    pub fn check_date_change(&mut self) -> bool {
        if self.stats.check_date_change() {
            self.state.daily_stats = self.stats.snapshot();
            return true;
        }
        false
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn complete_phase(&mut self) -> Event {
        self.disarm(TimerStatus::Idle);
        self.sound.stop_all();

        let completed = self.state.phase;
        let auto_start = if completed == Phase::Work {
            self.sound
                .play(self.state.sound_settings.work_complete_sound);
            self.count_completed_pomodoro();
            self.state.phase = self.state.settings.break_after(self.state.completed_cycles);
            self.state.settings.auto_start_breaks
        } else {
            self.sound.stop_all();
            self.sound
                .play(self.state.sound_settings.break_complete_sound);
            self.state.phase = Phase::Work;
            self.state.settings.auto_start_pomodoros
        };

        // The completion sound keeps playing through the reload.
        self.load_phase_duration();
        if auto_start {
            self.arm();
        }

        self.show_completion_notification(completed);
        self.refresh_badge();

        tracing::info!(
            ?completed,
            next = ?self.state.phase,
            cycles = self.state.completed_cycles,
            auto_start,
            "phase completed"
        );
        Event::PhaseCompleted {
            completed,
            next: self.state.phase,
            completed_cycles: self.state.completed_cycles,
            auto_started: auto_start,
            at: Utc::now(),
        }
    }

    fn count_completed_pomodoro(&mut self) {
        self.state.completed_cycles += 1;
        self.stats.add_completed_pomodoro();
        self.state.daily_stats = self.stats.snapshot();
    }

    fn show_completion_notification(&mut self, completed: Phase) {
        let language = Language::from_store(self.store.as_ref());
        let (title, message) = completion_message(completed, language);
        self.notifier.notify(title, message);
    }

    fn load_phase_duration(&mut self) {
        self.state.time_remaining_secs = self.state.settings.duration_secs(self.state.phase);
        self.state.display_time = format_time(self.state.time_remaining_secs);
    }

    fn arm(&mut self) {
        self.state.status = TimerStatus::Running;
        self.armed = true;
    }

    fn disarm(&mut self, status: TimerStatus) {
        self.state.status = status;
        self.armed = false;
    }

    fn refresh_badge(&mut self) {
        self.badge.render(
            self.state.phase,
            self.state.time_remaining_secs,
            self.state.status,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoundEffect;
    use crate::clock::ManualClock;
    use crate::stats::DailyStats;
    use crate::storage::{self, keys, MemoryStore, Namespace};
    use crate::surfaces::{RecordingAudio, RecordingBadge, RecordingNotifier};
    use crate::timer::{PAUSED_COLOR, SHORT_BREAK_COLOR};
    use chrono::NaiveDate;

    struct Harness {
        timer: TimerManager,
        audio: RecordingAudio,
        badge: RecordingBadge,
        notifier: RecordingNotifier,
        store: Arc<MemoryStore>,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let audio = RecordingAudio::new();
        let badge = RecordingBadge::new();
        let notifier = RecordingNotifier::new();
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let timer = TimerManager::new(
            TimerSurfaces {
                audio: Box::new(audio.clone()),
                badge: Box::new(badge.clone()),
                notifier: Box::new(notifier.clone()),
            },
            store.clone(),
            Arc::new(clock.clone()),
        );
        Harness {
            timer,
            audio,
            badge,
            notifier,
            store,
            clock,
        }
    }

    fn run_ticks(timer: &mut TimerManager, n: u32) -> Vec<Event> {
        (0..n).filter_map(|_| timer.tick()).collect()
    }

    #[test]
    fn start_twice_is_a_noop() {
        let mut h = harness();
        assert!(h.timer.start().is_some());
        assert!(h.timer.start().is_none());
        assert!(h.timer.is_armed());
    }

    #[test]
    fn manual_work_start_plays_cue() {
        let mut h = harness();
        h.timer.start();
        assert_eq!(h.audio.log().played(), vec![SoundEffect::Timer]);

        h.timer.pause();
        h.timer.start();
        // Resuming does not replay the cue.
        assert_eq!(h.audio.log().played(), vec![SoundEffect::Timer]);
    }

    #[test]
    fn pause_only_from_running() {
        let mut h = harness();
        assert!(h.timer.pause().is_none());
        h.timer.start();
        h.timer.tick();
        assert!(h.timer.pause().is_some());
        assert_eq!(h.timer.state().status, TimerStatus::Paused);
        assert_eq!(h.timer.state().time_remaining_secs, 1499);
        assert!(!h.timer.is_armed());
        assert_eq!(h.badge.last().unwrap().color, PAUSED_COLOR);
    }

    #[test]
    fn ticks_are_ignored_unless_running() {
        let mut h = harness();
        assert!(h.timer.tick().is_none());
        assert_eq!(h.timer.state().time_remaining_secs, 1500);
    }

    #[test]
    fn full_work_phase_completes_into_short_break() {
        let mut h = harness();
        h.timer.start();
        let events = run_ticks(&mut h.timer, 1500);

        let state = h.timer.state();
        assert_eq!(state.phase, Phase::ShortBreak);
        assert_eq!(state.completed_cycles, 1);
        assert_eq!(state.time_remaining_secs, 300);
        assert_eq!(state.status, TimerStatus::Running);
        assert_eq!(state.daily_stats.work_seconds, 1500);
        assert_eq!(state.daily_stats.pomodoros_completed, 1);
        assert!(matches!(
            events.last(),
            Some(Event::PhaseCompleted {
                completed: Phase::Work,
                next: Phase::ShortBreak,
                auto_started: true,
                ..
            })
        ));
        assert_eq!(h.badge.last().unwrap().color, SHORT_BREAK_COLOR);
        assert_eq!(
            h.notifier.shown(),
            vec![(
                "Work session complete!".to_string(),
                "Time to take a break.".to_string()
            )]
        );

        let log = h.audio.log();
        assert_eq!(log.played(), vec![SoundEffect::Timer, SoundEffect::BellDing]);
        // Completion sound still audible afterwards.
        assert_eq!(log.playing, Some(SoundEffect::BellDing));
        assert_eq!(log.overlaps, 0);
    }

    #[test]
    fn fourth_work_phase_earns_long_break() {
        let mut h = harness();
        for _ in 0..3 {
            h.timer.skip();
            h.timer.skip();
        }
        assert_eq!(h.timer.state().completed_cycles, 3);
        h.timer.skip();
        assert_eq!(h.timer.state().phase, Phase::LongBreak);
        assert_eq!(h.timer.state().time_remaining_secs, 900);
    }

    #[test]
    fn break_completion_waits_for_manual_start() {
        let mut h = harness();
        h.timer.update_settings(&TimerSettingsPatch {
            short_break_duration: Some(1),
            ..Default::default()
        });
        h.timer.skip();
        assert_eq!(h.timer.state().status, TimerStatus::Running);

        run_ticks(&mut h.timer, 60);
        assert_eq!(h.timer.state().phase, Phase::Work);
        assert_eq!(h.timer.state().status, TimerStatus::Idle);
        assert!(!h.timer.is_armed());
        assert_eq!(h.notifier.shown()[0].0, "Break is over!");
    }

    #[test]
    fn break_completion_stops_twice_before_its_sound() {
        use crate::surfaces::AudioCall;

        let mut h = harness();
        h.timer.update_settings(&TimerSettingsPatch {
            short_break_duration: Some(1),
            ..Default::default()
        });
        h.timer.skip();
        let before = h.audio.log().calls.len();

        run_ticks(&mut h.timer, 60);
        let log = h.audio.log();
        assert_eq!(
            log.calls[before..],
            [
                AudioCall::StopAll,
                AudioCall::StopAll,
                AudioCall::Play(SoundEffect::Timer, 0.7),
            ]
        );
        assert_eq!(log.overlaps, 0);
    }

    #[test]
    fn skip_keeps_prior_status_without_auto_start() {
        let mut h = harness();
        h.timer.update_settings(&TimerSettingsPatch {
            auto_start_breaks: Some(false),
            ..Default::default()
        });
        h.timer.skip();
        assert_eq!(h.timer.state().phase, Phase::ShortBreak);
        assert_eq!(h.timer.state().status, TimerStatus::Idle);
        assert!(!h.timer.is_armed());

        h.timer.skip();
        h.timer.start();
        h.timer.skip();
        // Was running, so keeps counting down.
        assert_eq!(h.timer.state().status, TimerStatus::Running);
        assert!(h.timer.is_armed());
        assert!(h.timer.tick().is_some());
    }

    #[test]
    fn settings_only_reload_duration_when_idle() {
        let mut h = harness();
        h.timer.update_settings(&TimerSettingsPatch {
            work_duration: Some(50),
            ..Default::default()
        });
        assert_eq!(h.timer.state().time_remaining_secs, 3000);

        h.timer.start();
        h.timer.update_settings(&TimerSettingsPatch {
            work_duration: Some(10),
            ..Default::default()
        });
        assert_eq!(h.timer.state().time_remaining_secs, 3000);
        assert_eq!(h.timer.state().settings.work_duration, 10);
    }

    #[test]
    fn restore_rearms_running_timer_and_is_idempotent() {
        let mut h = harness();
        let saved = SavedTimerState {
            phase: Some(Phase::Work),
            status: Some(TimerStatus::Running),
            time_remaining_secs: Some(42),
            completed_cycles: Some(2),
            daily_stats: Some(DailyStats {
                date: "2026-03-02".into(),
                work_seconds: 600,
                pomodoros_completed: 2,
            }),
            ..Default::default()
        };
        h.timer.restore(saved.clone());
        let first = h.timer.state().clone();
        h.timer.restore(saved);
        assert_eq!(h.timer.state(), &first);

        assert!(h.timer.is_armed());
        assert_eq!(first.display_time, "00:42");
        assert_eq!(first.daily_stats.work_seconds, 600);
    }

    #[test]
    fn restore_discards_yesterdays_stats() {
        let mut h = harness();
        h.timer.restore(SavedTimerState {
            daily_stats: Some(DailyStats {
                date: "2026-03-01".into(),
                work_seconds: 600,
                pomodoros_completed: 2,
            }),
            ..Default::default()
        });
        assert_eq!(h.timer.state().daily_stats.work_seconds, 0);
        assert_eq!(h.timer.state().daily_stats.date, "2026-03-02");
    }

    #[test]
    fn date_change_is_reported_once() {
        let mut h = harness();
        h.timer.start();
        run_ticks(&mut h.timer, 10);
        assert!(!h.timer.check_date_change());

        h.clock.advance(chrono::Duration::days(1));
        assert!(h.timer.check_date_change());
        assert_eq!(h.timer.state().daily_stats.work_seconds, 0);
        assert!(!h.timer.check_date_change());
    }

    #[test]
    fn notification_follows_stored_language() {
        let mut h = harness();
        storage::save(h.store.as_ref(), Namespace::Sync, keys::LANGUAGE, &"zh").unwrap();
        h.timer.update_settings(&TimerSettingsPatch {
            work_duration: Some(1),
            ..Default::default()
        });
        h.timer.start();
        run_ticks(&mut h.timer, 60);
        assert_eq!(h.notifier.shown()[0].0, "工作完成！");
    }

    #[test]
    fn get_state_refreshes_badge() {
        let mut h = harness();
        let before = h.badge.renders();
        let state = h.timer.get_state();
        assert_eq!(state.display_time, "25:00");
        assert_eq!(h.badge.renders(), before + 1);
    }
}
