//! SQLite-backed durable store.
//!
//! One `kv` table keyed by `(namespace, key)` holds both the local and the
//! synchronized namespace. Values are stored as JSON text.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tokio::sync::broadcast;

use super::{data_dir, DurableStore, Namespace, StoreChange, CHANGE_CHANNEL_CAPACITY};
use crate::error::StoreError;

/// SQLite database for FocusGate state.
pub struct Database {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl Database {
    /// Open the database at `<data_dir>/focusgate.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StoreError> {
        let dir = data_dir().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Self::open_at(dir.join("focusgate.db"))
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let db = Self {
            conn: Mutex::new(conn),
            changes,
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                namespace  TEXT NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (namespace, key)
            );",
        )?;
        Ok(())
    }

    /// List every key stored under a namespace.
    pub fn keys(&self, namespace: Namespace) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT key FROM kv WHERE namespace = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![namespace.as_str()], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

impl DurableStore for Database {
    fn get(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE namespace = ?1 AND key = ?2")?;
        let result = stmt.query_row(params![namespace.as_str(), key], |row| {
            row.get::<_, String>(0)
        });
        let text = match result {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Malformed {
                key: key.to_string(),
                source,
            })
    }

    fn set(
        &self,
        namespace: Namespace,
        entries: Vec<(String, serde_json::Value)>,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut keys = Vec::with_capacity(entries.len());
        {
            let mut conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
            let tx = conn.transaction()?;
            for (key, value) in entries {
                tx.execute(
                    "INSERT OR REPLACE INTO kv (namespace, key, value, updated_at)
                     VALUES (?1, ?2, ?3, datetime('now'))",
                    params![namespace.as_str(), key, value.to_string()],
                )?;
                keys.push(key);
            }
            tx.commit()?;
        }
        // No listeners is fine.
        let _ = self.changes.send(StoreChange { namespace, keys });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kv_store() {
        let db = Database::open_memory().unwrap();
        assert!(db.get(Namespace::Local, "test").unwrap().is_none());
        db.set(Namespace::Local, vec![("test".into(), json!("hello"))])
            .unwrap();
        assert_eq!(
            db.get(Namespace::Local, "test").unwrap(),
            Some(json!("hello"))
        );
    }

    #[test]
    fn set_overwrites_and_notifies() {
        let db = Database::open_memory().unwrap();
        let mut rx = db.subscribe();
        db.set(Namespace::Sync, vec![("language".into(), json!("en"))])
            .unwrap();
        db.set(Namespace::Sync, vec![("language".into(), json!("zh"))])
            .unwrap();

        assert_eq!(
            db.get(Namespace::Sync, "language").unwrap(),
            Some(json!("zh"))
        );
        let first = rx.try_recv().unwrap();
        assert_eq!(first.namespace, Namespace::Sync);
        assert!(first.touches("language"));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusgate.db");
        {
            let db = Database::open_at(&path).unwrap();
            db.set(
                Namespace::Local,
                vec![("timerState".into(), json!({"status": "running"}))],
            )
            .unwrap();
        }
        let db = Database::open_at(&path).unwrap();
        assert_eq!(
            db.get(Namespace::Local, "timerState").unwrap(),
            Some(json!({"status": "running"}))
        );
        assert_eq!(db.keys(Namespace::Local).unwrap(), vec!["timerState"]);
    }
}
