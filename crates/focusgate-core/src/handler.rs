//! Request dispatch, broadcasting and persistence.
//!
//! [`MessageHandler`] is the only path from the outside world into the
//! timer. Every command that changes the timer results in a
//! `STATE_UPDATE` broadcast and a (throttled) write of the snapshot to the
//! durable store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audio::UiSettings;
use crate::error::StoreError;
use crate::events::Event;
use crate::storage::{self, keys, DurableStore, Namespace};
use crate::timer::{
    SavedTimerState, SoundSettingsPatch, TimerManager, TimerSettingsPatch, TimerState,
};

/// Buffered events per subscriber before it starts lagging.
pub const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    GetState,
    Start,
    Pause,
    Reset,
    Skip,
    UpdateSettings { settings: TimerSettingsPatch },
    UpdateSoundSettings { settings: SoundSettingsPatch },
    UpdateUiSettings { settings: UiSettings },
    CloseOffscreen,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    State(TimerState),
    Ack { success: bool },
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack { success: true }
    }
}

/// Outcome of a broadcast. Having nobody listening is normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered(usize),
    NoSubscribers,
}

/// Kinds of observer that listen to broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Popup,
    /// Settings page. Does not want per-second state updates.
    Options,
    Blocked,
    Content,
    /// Line-oriented host connection of the `run` daemon.
    Stdio,
}

impl ContextKind {
    pub fn accepts(self, event: &Event) -> bool {
        match self {
            ContextKind::Options => !matches!(event, Event::StateUpdate { .. }),
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<Event>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: Event) -> Delivery {
        match self.tx.send(event) {
            Ok(n) => Delivery::Delivered(n),
            Err(_) => {
                tracing::trace!("no contexts listening, broadcast dropped");
                Delivery::NoSubscribers
            }
        }
    }

    pub fn subscribe(&self, kind: ContextKind) -> ContextReceiver {
        ContextReceiver {
            kind,
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(BROADCAST_CAPACITY)
    }
}

/// One context's view of the broadcast stream, filtered by its kind.
pub struct ContextReceiver {
    kind: ContextKind,
    rx: broadcast::Receiver<Event>,
}

impl ContextReceiver {
    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Next event for this context, or `None` once the sender is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.kind.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(context = ?self.kind, skipped, "context lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`ContextReceiver::recv`].
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.kind.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(context = ?self.kind, skipped, "context lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

/// At most one write per interval; pending changes are remembered.
#[derive(Debug)]
pub struct SaveThrottle {
    interval: Duration,
    last_save: Option<Instant>,
    dirty: bool,
}

impl SaveThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_save: None,
            dirty: false,
        }
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.dirty
            && self
                .last_save
                .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    pub fn mark_saved(&mut self, now: Instant) {
        self.last_save = Some(now);
        self.dirty = false;
    }
}

pub struct MessageHandler {
    timer: TimerManager,
    broadcaster: Broadcaster,
    store: Arc<dyn DurableStore>,
    throttle: SaveThrottle,
}

impl MessageHandler {
    pub fn new(
        timer: TimerManager,
        broadcaster: Broadcaster,
        store: Arc<dyn DurableStore>,
        save_interval: Duration,
    ) -> Self {
        Self {
            timer,
            broadcaster,
            store,
            throttle: SaveThrottle::new(save_interval),
        }
    }

    pub fn timer(&self) -> &TimerManager {
        &self.timer
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn handle(&mut self, request: Request) -> Response {
        tracing::debug!(?request, "handling request");
        match request {
            Request::GetState => {
                self.timer.sound_mut().stop_all();
                let state = self.timer.get_state();
                self.broadcaster.publish(Event::StateUpdate {
                    state: state.clone(),
                });
                return Response::State(state);
            }
            Request::Start => {
                let event = self.timer.start();
                self.apply(event);
            }
            Request::Pause => {
                let event = self.timer.pause();
                self.apply(event);
            }
            Request::Reset => {
                let event = self.timer.reset();
                self.apply(event);
            }
            Request::Skip => {
                let event = self.timer.skip();
                self.apply(event);
            }
            Request::UpdateSettings { settings } => {
                let event = self.timer.update_settings(&settings);
                self.apply(event);
            }
            Request::UpdateSoundSettings { settings } => {
                let event = self.timer.update_sound_settings(&settings);
                self.apply(event);
            }
            Request::UpdateUiSettings { settings } => {
                if let Some(volume) = settings.sound_volume {
                    self.timer.sound_mut().set_volume(volume);
                }
            }
            Request::CloseOffscreen => self.timer.sound_mut().close(),
        }
        Response::ack()
    }

    /// One second elapsed on the tick source.
    pub fn tick(&mut self) -> Option<Event> {
        let event = self.timer.tick();
        self.apply(event.clone());
        event
    }

    pub fn check_date_change(&mut self) {
        if self.timer.check_date_change() {
            self.throttle.mark_dirty();
            self.broadcast_state();
        }
    }

    /// Load the persisted snapshot and synchronized settings.
    pub fn restore_from_store(&mut self) {
        let saved = match storage::load::<SavedTimerState>(
            self.store.as_ref(),
            Namespace::Local,
            keys::TIMER_STATE,
        ) {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read saved timer state, starting fresh");
                SavedTimerState::default()
            }
        };
        self.timer.restore(saved);

        match storage::load::<TimerSettingsPatch>(
            self.store.as_ref(),
            Namespace::Sync,
            keys::TIMER_SETTINGS,
        ) {
            Ok(Some(patch)) => {
                self.timer.update_settings(&patch);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable timer settings"),
        }
        match storage::load::<SoundSettingsPatch>(
            self.store.as_ref(),
            Namespace::Sync,
            keys::SOUND_SETTINGS,
        ) {
            Ok(Some(patch)) => {
                self.timer.update_sound_settings(&patch);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable sound settings"),
        }
    }

    /// Write pending changes if the throttle interval has passed.
    pub fn persist_if_due(&mut self) {
        let now = Instant::now();
        if self.throttle.is_due(now) {
            if let Err(e) = self.persist(now) {
                tracing::warn!(error = %e, "failed to persist timer state");
            }
        }
    }

    /// Write the current snapshot regardless of the throttle.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.persist(Instant::now())
    }

    fn apply(&mut self, event: Option<Event>) {
        let Some(event) = event else {
            return;
        };
        self.broadcast_state();
        if event.is_forwarded() {
            self.broadcaster.publish(event);
        }
        self.throttle.mark_dirty();
        self.persist_if_due();
    }

    fn broadcast_state(&self) {
        self.broadcaster.publish(Event::StateUpdate {
            state: self.timer.state().clone(),
        });
    }

    fn persist(&mut self, now: Instant) -> Result<(), StoreError> {
        let state = self.timer.state();
        storage::save(self.store.as_ref(), Namespace::Local, keys::TIMER_STATE, state)?;

        let encode = |key: &str, value: serde_json::Result<serde_json::Value>| {
            value
                .map(|v| (key.to_string(), v))
                .map_err(|source| StoreError::Malformed {
                    key: key.to_string(),
                    source,
                })
        };
        let entries = vec![
            encode(keys::TIMER_SETTINGS, serde_json::to_value(&state.settings))?,
            encode(keys::SOUND_SETTINGS, serde_json::to_value(&state.sound_settings))?,
        ];
        self.store.set(Namespace::Sync, entries)?;

        self.throttle.mark_saved(now);
        tracing::trace!("timer state persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;
    use crate::surfaces::{RecordingAudio, RecordingBadge, RecordingNotifier};
    use crate::timer::{Phase, TimerStatus, TimerSurfaces};
    use chrono::NaiveDate;

    fn handler_with(store: Arc<MemoryStore>, save_interval: Duration) -> MessageHandler {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let timer = TimerManager::new(
            TimerSurfaces {
                audio: Box::new(RecordingAudio::new()),
                badge: Box::new(RecordingBadge::new()),
                notifier: Box::new(RecordingNotifier::new()),
            },
            store.clone(),
            Arc::new(clock),
        );
        MessageHandler::new(timer, Broadcaster::default(), store, save_interval)
    }

    #[test]
    fn requests_parse_from_wire_names() {
        let request: Request =
            serde_json::from_str(r#"{"type": "UPDATE_SETTINGS", "settings": {"workDuration": 30}}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::UpdateSettings {
                settings: TimerSettingsPatch {
                    work_duration: Some(30),
                    ..Default::default()
                }
            }
        );
        let request: Request = serde_json::from_str(r#"{"type": "CLOSE_OFFSCREEN"}"#).unwrap();
        assert_eq!(request, Request::CloseOffscreen);
    }

    #[test]
    fn ack_serializes_as_success() {
        let json = serde_json::to_value(Response::ack()).unwrap();
        assert_eq!(json, serde_json::json!({"success": true}));
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let broadcaster = Broadcaster::default();
        let delivery = broadcaster.publish(Event::SettingsUpdated {
            at: chrono::Utc::now(),
        });
        assert_eq!(delivery, Delivery::NoSubscribers);
    }

    #[test]
    fn options_context_never_sees_state_updates() {
        let store = Arc::new(MemoryStore::new());
        let mut handler = handler_with(store, Duration::from_secs(5));
        let mut popup = handler.broadcaster().subscribe(ContextKind::Popup);
        let mut options = handler.broadcaster().subscribe(ContextKind::Options);

        handler.handle(Request::Start);
        assert!(matches!(popup.try_recv(), Some(Event::StateUpdate { .. })));
        assert!(options.try_recv().is_none());
    }

    #[test]
    fn get_state_replies_and_broadcasts() {
        let store = Arc::new(MemoryStore::new());
        let mut handler = handler_with(store, Duration::from_secs(5));
        let mut popup = handler.broadcaster().subscribe(ContextKind::Popup);

        let Response::State(state) = handler.handle(Request::GetState) else {
            panic!("expected state reply");
        };
        assert_eq!(state.status, TimerStatus::Idle);
        assert!(matches!(popup.try_recv(), Some(Event::StateUpdate { .. })));
    }

    #[test]
    fn noop_command_does_not_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let mut handler = handler_with(store, Duration::from_secs(5));
        let mut popup = handler.broadcaster().subscribe(ContextKind::Popup);

        assert_eq!(handler.handle(Request::Pause), Response::ack());
        assert!(popup.try_recv().is_none());
    }

    #[test]
    fn throttle_collapses_burst_of_ticks() {
        let store = Arc::new(MemoryStore::new());
        let mut handler = handler_with(store.clone(), Duration::from_secs(3600));
        let mut changes = store.subscribe();

        handler.handle(Request::Start);
        for _ in 0..30 {
            handler.tick();
        }

        // One local + one sync write for the first change, nothing after.
        let mut writes = 0;
        while changes.try_recv().is_ok() {
            writes += 1;
        }
        assert_eq!(writes, 2);

        handler.flush().unwrap();
        let saved: SavedTimerState = storage::load(store.as_ref(), Namespace::Local, keys::TIMER_STATE)
            .unwrap()
            .unwrap();
        assert_eq!(saved.time_remaining_secs, Some(1470));
    }

    #[test]
    fn throttle_due_only_after_interval() {
        let mut throttle = SaveThrottle::new(Duration::from_secs(5));
        let t0 = Instant::now();
        assert!(!throttle.is_due(t0));
        throttle.mark_dirty();
        assert!(throttle.is_due(t0));
        throttle.mark_saved(t0);
        throttle.mark_dirty();
        assert!(!throttle.is_due(t0 + Duration::from_secs(4)));
        assert!(throttle.is_due(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn persistence_failure_keeps_memory_state() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let mut handler = handler_with(store.clone(), Duration::ZERO);

        handler.handle(Request::Start);
        handler.tick();
        assert_eq!(handler.timer().state().time_remaining_secs, 1499);
        assert!(handler.flush().is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn restore_applies_synced_settings_over_snapshot() {
        let store = Arc::new(MemoryStore::new());
        storage::save(
            store.as_ref(),
            Namespace::Local,
            keys::TIMER_STATE,
            &serde_json::json!({"phase": "shortBreak", "status": "idle", "timeRemainingSecs": 120}),
        )
        .unwrap();
        storage::save(
            store.as_ref(),
            Namespace::Sync,
            keys::TIMER_SETTINGS,
            &serde_json::json!({"shortBreakDuration": 10}),
        )
        .unwrap();

        let mut handler = handler_with(store, Duration::from_secs(5));
        handler.restore_from_store();
        let state = handler.timer().state();
        assert_eq!(state.phase, Phase::ShortBreak);
        assert_eq!(state.settings.short_break_duration, 10);
        // Idle, so the new duration replaces the saved remaining time.
        assert_eq!(state.time_remaining_secs, 600);
    }

    #[test]
    fn ui_settings_refresh_volume_cache() {
        let store = Arc::new(MemoryStore::new());
        let mut handler = handler_with(store, Duration::from_secs(5));
        let response = handler.handle(Request::UpdateUiSettings {
            settings: UiSettings {
                sound_volume: Some(0.25),
            },
        });
        assert_eq!(response, Response::ack());
        assert_eq!(handler.timer.sound_mut().volume(), 0.25);
    }
}
