//! Daemon ownership of a data directory.
//!
//! While `focusgate run` is up, its in-memory timer is the only writer of
//! the timer snapshot and the timer/sound settings. It records a heartbeat
//! under the local `daemonLease` key; one-shot commands that would change
//! the timer check for a fresh lease and refuse to run. A lease whose
//! heartbeat is older than the TTL belongs to a daemon that died and is
//! ignored.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{keys, load, save, DurableStore, Namespace};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonLease {
    pub pid: u32,
    pub heartbeat: DateTime<Utc>,
}

impl DaemonLease {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.heartbeat) < ttl
    }

    /// The lease currently held, if its holder is still alive.
    pub fn current(
        store: &dyn DurableStore,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<Self>, StoreError> {
        let held = load::<Option<Self>>(store, Namespace::Local, keys::DAEMON_LEASE)?.flatten();
        Ok(held.filter(|lease| lease.is_fresh(now, ttl)))
    }

    /// Fails with [`StoreError::Leased`] while a live daemon owns the store.
    pub fn ensure_unowned(
        store: &dyn DurableStore,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        match Self::current(store, now, ttl)? {
            Some(lease) => Err(StoreError::Leased { pid: lease.pid }),
            None => Ok(()),
        }
    }

    /// Take ownership for `pid`. A stale lease is taken over; a live one
    /// held by another process is an error.
    pub fn acquire(
        store: &dyn DurableStore,
        pid: u32,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, StoreError> {
        if let Some(held) = Self::current(store, now, ttl)? {
            if held.pid != pid {
                return Err(StoreError::Leased { pid: held.pid });
            }
        }
        let lease = Self { pid, heartbeat: now };
        save(store, Namespace::Local, keys::DAEMON_LEASE, &lease)?;
        tracing::info!(pid, "daemon lease acquired");
        Ok(lease)
    }

    pub fn refresh(
        &mut self,
        store: &dyn DurableStore,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.heartbeat = now;
        save(store, Namespace::Local, keys::DAEMON_LEASE, &*self)
    }

    /// Give up ownership. A lease already taken over by another process is
    /// left alone.
    pub fn release(self, store: &dyn DurableStore) -> Result<(), StoreError> {
        let held = load::<Option<Self>>(store, Namespace::Local, keys::DAEMON_LEASE)?.flatten();
        if held.is_some_and(|lease| lease.pid == self.pid) {
            save(store, Namespace::Local, keys::DAEMON_LEASE, &Option::<Self>::None)?;
            tracing::info!(pid = self.pid, "daemon lease released");
        }
        Ok(())
    }
}
