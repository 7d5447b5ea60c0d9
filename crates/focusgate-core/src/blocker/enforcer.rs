//! Applies the blocking verdict to navigations and open tabs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use super::policy::{is_active, BlockerSettings, BlockingVerdict};
use crate::clock::WallClock;
use crate::error::{Result, ValidationError};
use crate::storage::{self, keys, BlockerConfig, DurableStore, Namespace};
use crate::timer::TimerState;

pub type TabId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
}

/// Host tab surface.
///
/// Hosts that can query their tabs directly ignore the lifecycle
/// notifications; hosts that only receive events use them to keep
/// `open_tabs` current.
pub trait TabHost: Send {
    fn open_tabs(&self) -> Vec<Tab>;
    fn redirect(&mut self, tab: TabId, url: &str);

    fn tab_updated(&mut self, _tab: TabId, _url: Option<String>) {}

    fn tab_removed(&mut self, _tab: TabId) {}
}

/// A pending top-level or sub-frame navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    pub tab_id: TabId,
    /// `0` is the top-level frame.
    pub frame_id: u32,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub tab_id: TabId,
    /// Blocked-page URL to load instead.
    pub url: String,
    /// Blocklist entry that matched.
    pub pattern: String,
    pub original_url: String,
}

pub struct SiteBlocker {
    config: BlockerConfig,
    store: Arc<dyn DurableStore>,
    clock: Arc<dyn WallClock>,
}

impl SiteBlocker {
    pub fn new(
        config: BlockerConfig,
        store: Arc<dyn DurableStore>,
        clock: Arc<dyn WallClock>,
    ) -> Self {
        Self {
            config,
            store,
            clock,
        }
    }

    /// Current blocker settings. Absent or unreadable settings mean no
    /// blocking.
    pub fn settings(&self) -> Option<BlockerSettings> {
        match storage::load(self.store.as_ref(), Namespace::Sync, keys::BLOCKER_SETTINGS) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read blocker settings, blocking disabled");
                None
            }
        }
    }

    pub fn verdict(&self, timer: Option<&TimerState>) -> BlockingVerdict {
        match self.settings() {
            Some(settings) => is_active(&settings, timer, self.clock.now()),
            None => {
                tracing::debug!("no blocker settings stored, blocking inactive");
                BlockingVerdict::inactive()
            }
        }
    }

    pub fn on_before_navigate(
        &self,
        navigation: &Navigation,
        timer: Option<&TimerState>,
    ) -> Option<Redirect> {
        if navigation.frame_id != 0 || self.is_internal(&navigation.url) {
            return None;
        }
        let verdict = self.verdict(timer);
        if !verdict.active {
            return None;
        }
        self.redirect_for(navigation.tab_id, &navigation.url, &verdict)
    }

    /// Redirects for every open tab currently showing a blocked site.
    pub fn sweep(&self, tabs: &[Tab], timer: Option<&TimerState>) -> Vec<Redirect> {
        let verdict = self.verdict(timer);
        if !verdict.active {
            return Vec::new();
        }
        tabs.iter()
            .filter_map(|tab| {
                let url = tab.url.as_deref()?;
                if self.is_internal(url) || self.is_blocked_page(url) {
                    return None;
                }
                self.redirect_for(tab.id, url, &verdict)
            })
            .collect()
    }

    /// Blocked-page URL carrying the block time and the original URL.
    pub fn blocked_page_url(&self, original_url: &str) -> String {
        let time = self.clock.now().format("%H:%M:%S").to_string();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("time", &time)
            .append_pair("url", original_url)
            .finish();
        format!("{}?{}", self.config.blocked_page_url, query)
    }

    fn redirect_for(&self, tab_id: TabId, raw: &str, verdict: &BlockingVerdict) -> Option<Redirect> {
        let parsed = match Url::parse(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(url = raw, error = %e, "skipping unparseable url");
                return None;
            }
        };
        let host = parsed.host_str().filter(|h| !h.is_empty())?;
        let pattern = verdict.matching(host)?;

        tracing::info!(tab_id, url = raw, pattern, "redirecting blocked site");
        Some(Redirect {
            tab_id,
            url: self.blocked_page_url(raw),
            pattern: pattern.to_string(),
            original_url: raw.to_string(),
        })
    }

    fn is_internal(&self, url: &str) -> bool {
        !self.config.internal_url_prefix.is_empty()
            && url.starts_with(&self.config.internal_url_prefix)
    }

    fn is_blocked_page(&self, url: &str) -> bool {
        url.starts_with(&self.config.blocked_page_url)
    }
}

/// Load the stored settings (or the editor defaults), apply `change` and
/// write the result back. Nothing is written when `change` fails.
pub fn edit_settings<F>(store: &dyn DurableStore, change: F) -> Result<BlockerSettings>
where
    F: FnOnce(&mut BlockerSettings) -> std::result::Result<(), ValidationError>,
{
    let mut settings =
        storage::load::<BlockerSettings>(store, Namespace::Sync, keys::BLOCKER_SETTINGS)?
            .unwrap_or_default();
    change(&mut settings)?;
    storage::save(store, Namespace::Sync, keys::BLOCKER_SETTINGS, &settings)?;
    tracing::info!(mode = ?settings.mode, sites = settings.blocked_sites.len(), "blocker settings saved");
    Ok(settings)
}
