//! Phase-completion notifications and their translations.

use serde::{Deserialize, Serialize};

use crate::storage::{self, keys, DurableStore, Namespace};
use crate::timer::Phase;

/// Host notification surface.
pub trait Notifier: Send {
    fn notify(&mut self, title: &str, message: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::En),
            "zh" => Some(Language::Zh),
            _ => None,
        }
    }

    /// Persisted language preference, falling back to English when absent,
    /// unrecognized or unreadable.
    pub fn from_store(store: &dyn DurableStore) -> Self {
        match storage::load::<serde_json::Value>(store, Namespace::Sync, keys::LANGUAGE) {
            Ok(Some(serde_json::Value::String(code))) => {
                Self::parse(&code).unwrap_or_default()
            }
            Ok(_) => Self::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read language preference, using default");
                Self::default()
            }
        }
    }
}

/// Translate a background message key. Unknown keys come back unchanged.
pub fn translate<'a>(key: &'a str, language: Language) -> &'a str {
    let text = match (language, key) {
        (Language::En, "timer.work_complete") => "Work session complete!",
        (Language::En, "timer.break_complete") => "Break is over!",
        (Language::En, "notification.time_to_break") => "Time to take a break.",
        (Language::En, "notification.time_to_work") => "Time to get back to work.",
        (Language::Zh, "timer.work_complete") => "工作完成！",
        (Language::Zh, "timer.break_complete") => "休息结束！",
        (Language::Zh, "notification.time_to_break") => "该休息一下了。",
        (Language::Zh, "notification.time_to_work") => "该回到工作了。",
        (Language::Zh, _) => return translate(key, Language::En),
        _ => return key,
    };
    text
}

/// Title and body for the notification shown when `completed` ends.
pub fn completion_message(completed: Phase, language: Language) -> (&'static str, &'static str) {
    let (title_key, message_key) = if completed == Phase::Work {
        ("timer.work_complete", "notification.time_to_break")
    } else {
        ("timer.break_complete", "notification.time_to_work")
    };
    (translate(title_key, language), translate(message_key, language))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn language_defaults_to_english() {
        let store = MemoryStore::new();
        assert_eq!(Language::from_store(&store), Language::En);

        storage::save(&store, Namespace::Sync, keys::LANGUAGE, &"fr").unwrap();
        assert_eq!(Language::from_store(&store), Language::En);

        storage::save(&store, Namespace::Sync, keys::LANGUAGE, &"zh").unwrap();
        assert_eq!(Language::from_store(&store), Language::Zh);
    }

    #[test]
    fn completion_message_names_completed_phase() {
        let (title, message) = completion_message(Phase::Work, Language::En);
        assert_eq!(title, "Work session complete!");
        assert_eq!(message, "Time to take a break.");

        let (title, _) = completion_message(Phase::LongBreak, Language::Zh);
        assert_eq!(title, "休息结束！");
    }

    #[test]
    fn unknown_key_passes_through() {
        assert_eq!(translate("settings.missing", Language::Zh), "settings.missing");
    }
}
