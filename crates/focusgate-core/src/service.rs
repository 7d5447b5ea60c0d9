//! Background service.
//!
//! [`Background`] bundles the message handler, the site blocker and the tab
//! host. The daemon keeps it behind one `tokio::sync::Mutex` so every event
//! (tick, request, navigation, sweep, stats check) runs to completion before
//! the next one starts.
//!
//! ## Loops
//!
//! ```text
//! tick        every tick_interval      -> timer tick (when armed), throttled save
//! stats       every stats_interval     -> daily rollover check
//! sweep       every sweep_interval     -> redirect open blocked tabs
//! store       on blockerSettings / timerState writes -> sweep
//! shutdown    ctrl_c or host EOF        -> flush
//! ```

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};

use crate::blocker::{Navigation, Redirect, SiteBlocker, TabHost, TabId};
use crate::clock::WallClock;
use crate::events::Event;
use crate::handler::{Broadcaster, MessageHandler, Request, Response};
use crate::storage::{keys, Config, DaemonConfig, DurableStore, StoreChange};
use crate::timer::{Phase, TimerManager, TimerStatus, TimerSurfaces};

pub type SharedBackground = Arc<Mutex<Background>>;

/// Tab lifecycle notifications from the host browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum BrowserEvent {
    BeforeNavigate {
        tab_id: TabId,
        #[serde(default)]
        frame_id: u32,
        url: String,
    },
    TabUpdated {
        tab_id: TabId,
        #[serde(default)]
        url: Option<String>,
    },
    TabRemoved {
        tab_id: TabId,
    },
}

pub struct Background {
    handler: MessageHandler,
    blocker: SiteBlocker,
    tabs: Box<dyn TabHost>,
    last_activity: Option<(Phase, TimerStatus)>,
}

impl Background {
    pub fn new(
        config: &Config,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn WallClock>,
        surfaces: TimerSurfaces,
        tabs: Box<dyn TabHost>,
    ) -> Self {
        let timer = TimerManager::new(surfaces, store.clone(), clock.clone());
        let handler = MessageHandler::new(
            timer,
            Broadcaster::default(),
            store.clone(),
            config.daemon.save_interval(),
        );
        let blocker = SiteBlocker::new(config.blocker.clone(), store, clock);
        Self {
            handler,
            blocker,
            tabs,
            last_activity: None,
        }
    }

    pub fn handler(&self) -> &MessageHandler {
        &self.handler
    }

    pub fn blocker(&self) -> &SiteBlocker {
        &self.blocker
    }

    pub fn broadcaster(&self) -> Broadcaster {
        self.handler.broadcaster().clone()
    }

    /// Restore persisted state and enforce blocking on already-open tabs.
    pub fn startup(&mut self) {
        self.handler.restore_from_store();
        self.last_activity = Some(self.handler.timer().activity());
        self.sweep();
    }

    pub fn handle(&mut self, request: Request) -> Response {
        let response = self.handler.handle(request);
        self.after_timer_change();
        response
    }

    /// Clock loop body. Only counts down while the timer is armed; pending
    /// saves are flushed on every call once the throttle allows.
    pub fn tick(&mut self) {
        if self.handler.timer().is_armed() {
            self.handler.tick();
            self.after_timer_change();
        }
        self.handler.persist_if_due();
    }

    pub fn check_stats(&mut self) {
        self.handler.check_date_change();
    }

    pub fn on_browser_event(&mut self, event: BrowserEvent) -> Option<Redirect> {
        match event {
            BrowserEvent::BeforeNavigate {
                tab_id,
                frame_id,
                url,
            } => {
                let navigation = Navigation {
                    tab_id,
                    frame_id,
                    url,
                };
                self.navigate(&navigation)
            }
            BrowserEvent::TabUpdated { tab_id, url } => {
                self.tabs.tab_updated(tab_id, url);
                None
            }
            BrowserEvent::TabRemoved { tab_id } => {
                self.tabs.tab_removed(tab_id);
                None
            }
        }
    }

    pub fn navigate(&mut self, navigation: &Navigation) -> Option<Redirect> {
        let redirect = self
            .blocker
            .on_before_navigate(navigation, Some(self.handler.timer().state()))?;
        self.apply_redirect(&redirect);
        Some(redirect)
    }

    pub fn sweep(&mut self) -> Vec<Redirect> {
        let tabs = self.tabs.open_tabs();
        let redirects = self
            .blocker
            .sweep(&tabs, Some(self.handler.timer().state()));
        for redirect in &redirects {
            self.apply_redirect(redirect);
        }
        if !redirects.is_empty() {
            tracing::info!(count = redirects.len(), "sweep redirected open tabs");
        }
        redirects
    }

    pub fn on_store_change(&mut self, change: &StoreChange) {
        if change.touches(keys::BLOCKER_SETTINGS) || change.touches(keys::TIMER_STATE) {
            tracing::debug!(namespace = change.namespace.as_str(), keys = ?change.keys, "store changed, sweeping");
            self.sweep();
        }
    }

    /// Final write on shutdown or at the end of a one-shot command.
    pub fn flush(&mut self) {
        if let Err(e) = self.handler.flush() {
            tracing::warn!(error = %e, "failed to flush timer state");
        }
    }

    fn apply_redirect(&mut self, redirect: &Redirect) {
        self.tabs.redirect(redirect.tab_id, &redirect.url);
        self.handler.broadcaster().publish(Event::TabBlocked {
            tab_id: redirect.tab_id,
            url: redirect.original_url.clone(),
            pattern: redirect.pattern.clone(),
            at: Utc::now(),
        });
    }

    fn after_timer_change(&mut self) {
        let activity = self.handler.timer().activity();
        if self.last_activity != Some(activity) {
            self.last_activity = Some(activity);
            self.sweep();
        }
    }
}

/// Drive the background loops until `shutdown` resolves, then flush.
pub async fn run_until<F>(
    background: SharedBackground,
    config: &DaemonConfig,
    mut changes: broadcast::Receiver<StoreChange>,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut tick = interval(config.tick_interval());
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = interval(config.stats_check_interval());
    stats.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sweep = interval(config.sweep_interval());
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick of an interval fires immediately.
    tick.tick().await;
    stats.tick().await;
    sweep.tick().await;

    tokio::pin!(shutdown);
    let mut listening = true;

    loop {
        tokio::select! {
            _ = tick.tick() => {
                background.lock().await.tick();
            }
            _ = stats.tick() => {
                background.lock().await.check_stats();
            }
            _ = sweep.tick() => {
                background.lock().await.sweep();
            }
            change = changes.recv(), if listening => {
                match change {
                    Ok(change) => background.lock().await.on_store_change(&change),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "store change listener lagged, sweeping");
                        background.lock().await.sweep();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("store change channel closed");
                        listening = false;
                    }
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutting down background service");
                break;
            }
        }
    }

    background.lock().await.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocker::{BlockerSettings, Tab};
    use crate::clock::ManualClock;
    use crate::handler::ContextKind;
    use crate::storage::{self, MemoryStore, Namespace};
    use crate::surfaces::{RecordingAudio, RecordingBadge, RecordingNotifier};
    use chrono::NaiveDate;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct FakeTabs {
        tabs: Arc<StdMutex<Vec<Tab>>>,
        redirects: Arc<StdMutex<Vec<(TabId, String)>>>,
    }

    impl TabHost for FakeTabs {
        fn open_tabs(&self) -> Vec<Tab> {
            self.tabs.lock().unwrap().clone()
        }

        fn redirect(&mut self, tab: TabId, url: &str) {
            self.redirects.lock().unwrap().push((tab, url.to_string()));
            for open in self.tabs.lock().unwrap().iter_mut() {
                if open.id == tab {
                    open.url = Some(url.to_string());
                }
            }
        }
    }

    fn background(store: Arc<MemoryStore>, tabs: FakeTabs) -> Background {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 2)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        Background::new(
            &Config::default(),
            store,
            Arc::new(clock),
            TimerSurfaces {
                audio: Box::new(RecordingAudio::new()),
                badge: Box::new(RecordingBadge::new()),
                notifier: Box::new(RecordingNotifier::new()),
            },
            Box::new(tabs),
        )
    }

    fn store_with_blocker() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        storage::save(
            store.as_ref(),
            Namespace::Sync,
            keys::BLOCKER_SETTINGS,
            &BlockerSettings::default(),
        )
        .unwrap();
        store
    }

    #[test]
    fn starting_work_sweeps_open_tabs() {
        let tabs = FakeTabs::default();
        tabs.tabs.lock().unwrap().push(Tab {
            id: 9,
            url: Some("https://www.reddit.com/".into()),
        });
        let mut bg = background(store_with_blocker(), tabs.clone());
        bg.startup();
        assert!(tabs.redirects.lock().unwrap().is_empty());

        let mut popup = bg.broadcaster().subscribe(ContextKind::Popup);
        bg.handle(Request::Start);
        let redirects = tabs.redirects.lock().unwrap().clone();
        assert_eq!(redirects.len(), 1);
        assert_eq!(redirects[0].0, 9);

        let mut saw_blocked = false;
        while let Some(event) = popup.try_recv() {
            saw_blocked |= matches!(event, Event::TabBlocked { tab_id: 9, .. });
        }
        assert!(saw_blocked);

        // Tab now shows the blocked page; a second sweep leaves it alone.
        assert!(bg.sweep().is_empty());
    }

    #[test]
    fn navigation_blocked_only_while_working() {
        let mut bg = background(store_with_blocker(), FakeTabs::default());
        bg.startup();
        let event = BrowserEvent::BeforeNavigate {
            tab_id: 1,
            frame_id: 0,
            url: "https://youtube.com/".into(),
        };
        assert!(bg.on_browser_event(event.clone()).is_none());

        bg.handle(Request::Start);
        assert!(bg.on_browser_event(event.clone()).is_some());

        bg.handle(Request::Pause);
        assert!(bg.on_browser_event(event).is_none());
    }

    #[test]
    fn tick_is_ignored_until_started() {
        let mut bg = background(Arc::new(MemoryStore::new()), FakeTabs::default());
        bg.startup();
        bg.tick();
        assert_eq!(bg.handler().timer().state().time_remaining_secs, 1500);
        bg.handle(Request::Start);
        bg.tick();
        assert_eq!(bg.handler().timer().state().time_remaining_secs, 1499);
    }

    #[test]
    fn browser_events_parse_from_wire_names() {
        let event: BrowserEvent = serde_json::from_str(
            r#"{"type": "BEFORE_NAVIGATE", "tabId": 4, "frameId": 0, "url": "https://x.com/"}"#,
        )
        .unwrap();
        assert!(matches!(event, BrowserEvent::BeforeNavigate { tab_id: 4, .. }));
        let event: BrowserEvent =
            serde_json::from_str(r#"{"type": "TAB_REMOVED", "tabId": 4}"#).unwrap();
        assert_eq!(event, BrowserEvent::TabRemoved { tab_id: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_counts_down_and_flushes_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let changes = store.subscribe();
        let shared: SharedBackground =
            Arc::new(Mutex::new(background(store.clone(), FakeTabs::default())));
        {
            let mut bg = shared.lock().await;
            bg.startup();
            bg.handle(Request::Start);
        }

        let config = DaemonConfig::default();
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(10_500));
        run_until(shared.clone(), &config, changes, shutdown).await;

        let remaining = shared.lock().await.handler().timer().state().time_remaining_secs;
        assert_eq!(remaining, 1490);
        let saved: crate::timer::SavedTimerState =
            storage::load(store.as_ref(), Namespace::Local, keys::TIMER_STATE)
                .unwrap()
                .unwrap();
        assert_eq!(saved.time_remaining_secs, Some(1490));
    }
}
