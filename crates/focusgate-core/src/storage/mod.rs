//! Durable storage.
//!
//! Two key-value namespaces back the background process:
//!
//! - [`Namespace::Local`] holds device-only transient state (the live timer
//!   snapshot).
//! - [`Namespace::Sync`] holds the durable cross-device profile (timer,
//!   sound, blocker and UI settings, language).
//!
//! Values are JSON. Every write publishes a [`StoreChange`] so listeners such
//! as the site blocker can react without polling.

mod config;
pub mod database;
mod lease;
pub mod memory;

pub use config::{BlockerConfig, Config, DaemonConfig, LogConfig};
pub use database::Database;
pub use lease::DaemonLease;
pub use memory::MemoryStore;

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::StoreError;

/// Persisted key names.
pub mod keys {
    pub const TIMER_STATE: &str = "timerState";
    pub const TIMER_SETTINGS: &str = "timerSettings";
    pub const SOUND_SETTINGS: &str = "soundSettings";
    pub const BLOCKER_SETTINGS: &str = "blockerSettings";
    pub const UI_SETTINGS: &str = "uiSettings";
    pub const LANGUAGE: &str = "language";
    pub const DAEMON_LEASE: &str = "daemonLease";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Local,
    Sync,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Local => "local",
            Namespace::Sync => "sync",
        }
    }
}

/// Published after every successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub namespace: Namespace,
    pub keys: Vec<String>,
}

impl StoreChange {
    pub fn touches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// Key-value store with change notification.
///
/// Writes are last-write-wins per key; there are no transactions across
/// keys or namespaces.
pub trait DurableStore: Send + Sync {
    fn get(&self, namespace: Namespace, key: &str)
        -> Result<Option<serde_json::Value>, StoreError>;

    fn set(
        &self,
        namespace: Namespace,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError>;

    /// Subscribe to change notifications for writes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;
}

/// Read and decode a typed value.
pub fn load<T: DeserializeOwned>(
    store: &dyn DurableStore,
    namespace: Namespace,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(namespace, key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Encode and write a single typed value.
pub fn save<T: Serialize>(
    store: &dyn DurableStore,
    namespace: Namespace,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })?;
    store.set(namespace, vec![(key.to_string(), value)])
}

/// Capacity of the change-notification channel. Slow listeners skip ahead.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Returns the FocusGate data directory.
///
/// `FOCUSGATE_DATA_DIR` wins when set. Otherwise `~/.config/focusgate`, or
/// `~/.config/focusgate-dev` with `FOCUSGATE_ENV=dev`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("FOCUSGATE_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("FOCUSGATE_ENV").unwrap_or_else(|_| "production".to_string());

            if env == "dev" {
                base_dir.join("focusgate-dev")
            } else {
                base_dir.join("focusgate")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        volume: f32,
    }

    #[test]
    fn typed_roundtrip_through_store() {
        let store = MemoryStore::new();
        save(&store, Namespace::Sync, "sample", &Sample { volume: 0.5 }).unwrap();
        let loaded: Option<Sample> = load(&store, Namespace::Sync, "sample").unwrap();
        assert_eq!(loaded, Some(Sample { volume: 0.5 }));
    }

    #[test]
    fn malformed_value_names_the_key() {
        let store = MemoryStore::new();
        store
            .set(
                Namespace::Sync,
                vec![("sample".into(), serde_json::json!("not an object"))],
            )
            .unwrap();
        let err = load::<Sample>(&store, Namespace::Sync, "sample").unwrap_err();
        assert!(err.to_string().contains("'sample'"));
    }

    #[test]
    fn namespaces_are_independent() {
        let store = MemoryStore::new();
        save(&store, Namespace::Local, "k", &1).unwrap();
        assert!(load::<i32>(&store, Namespace::Sync, "k").unwrap().is_none());
    }
}
