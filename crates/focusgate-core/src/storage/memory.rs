//! In-process store.
//!
//! Same semantics as [`super::Database`] without touching disk. Used by
//! tests and by the CLI's `--ephemeral` daemon mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use super::{DurableStore, Namespace, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<(Namespace, String), serde_json::Value>>>,
    changes: broadcast::Sender<StoreChange>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
            fail_writes: Arc::new(Mutex::new(false)),
        }
    }

    /// Make every subsequent write fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    /// Number of stored entries across both namespaces.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn get(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(&(namespace, key.to_string())).cloned())
    }

    fn set(
        &self,
        namespace: Namespace,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        if *self.fail_writes.lock().map_err(|_| StoreError::Poisoned)? {
            return Err(StoreError::QueryFailed("writes disabled".into()));
        }
        if entries.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::with_capacity(entries.len());
        {
            let mut map = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
            for (key, value) in entries {
                map.insert((namespace, key.clone()), value);
                keys.push(key);
            }
        }
        let _ = self.changes.send(StoreChange { namespace, keys });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}
