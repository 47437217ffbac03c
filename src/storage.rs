use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Namespaced keys for every kind of persisted data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKey {
    Users,
    CurrentUser,
    Sessions,
    Events(String),
    SchemaVersion,
    // Layout written by earlier releases, only read by the migration
    LegacyUsers,
    LegacyCurrentUser,
    LegacySessions,
}

impl StorageKey {
    pub fn as_key(&self) -> String {
        match self {
            StorageKey::Users => "auth/users".to_string(),
            StorageKey::CurrentUser => "auth/current_user".to_string(),
            StorageKey::Sessions => "sessions/index".to_string(),
            StorageKey::Events(id) => format!("sessions/events/{}", id),
            StorageKey::SchemaVersion => "meta/schema_version".to_string(),
            StorageKey::LegacyUsers => "users".to_string(),
            StorageKey::LegacyCurrentUser => "currentUser".to_string(),
            StorageKey::LegacySessions => "sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Set(String, String),
    Remove(String),
}

/// Raw string key-value backend
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// All stored keys starting with `prefix`, in key order
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
    /// Apply all operations together. Backends that support it commit them atomically.
    fn apply(&self, ops: &[BatchOp]) -> Result<(), StoreError>;
}

/// SQLite-backed store: a single `kv` table in a local database file
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and the `kv` table
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;
        Ok(SqliteStore { conn })
    }
}

const UPSERT_SQL: &str = r#"
    INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
"#;

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn
            .execute(UPSERT_SQL, params![key, value, Local::now().to_rfc3339()])?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // substr comparison keeps `%` and `_` in the prefix literal
        let mut stmt = self.conn.prepare(
            "SELECT key FROM kv WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let keys = stmt
            .query_map([prefix], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn apply(&self, ops: &[BatchOp]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();

        for op in ops {
            match op {
                BatchOp::Set(key, value) => {
                    tx.execute(UPSERT_SQL, params![key, value, now])?;
                }
                BatchOp::Remove(key) => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// In-memory store for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .entries
            .borrow()
            .range(prefix.to_string()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn apply(&self, ops: &[BatchOp]) -> Result<(), StoreError> {
        let mut entries = self.entries.borrow_mut();
        for op in ops {
            match op {
                BatchOp::Set(key, value) => {
                    entries.insert(key.clone(), value.clone());
                }
                BatchOp::Remove(key) => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}

/// A group of writes applied in one go through [`Storage::apply`]
#[derive(Debug, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_json<T: Serialize + ?Sized>(
        &mut self,
        key: &StorageKey,
        value: &T,
    ) -> Result<&mut Self, StoreError> {
        let key = key.as_key();
        let encoded = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.ops.push(BatchOp::Set(key, encoded));
        Ok(self)
    }

    pub fn remove(&mut self, key: &StorageKey) -> &mut Self {
        self.ops.push(BatchOp::Remove(key.as_key()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
}

/// Typed JSON access on top of a [`KeyValueStore`].
///
/// Reads are fail-soft: a backend error or an undecodable value is logged and
/// reported as absent. Writes propagate their errors.
pub struct Storage {
    backend: Box<dyn KeyValueStore>,
}

impl Storage {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn read_raw(&self, key: &StorageKey) -> Option<String> {
        let key = key.as_key();
        match self.backend.get(&key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "storage read failed");
                None
            }
        }
    }

    pub fn read_json<T: DeserializeOwned>(&self, key: &StorageKey) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!(key = %key.as_key(), "storage read");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key.as_key(), error = %e, "discarding unparseable stored value");
                None
            }
        }
    }

    /// Read a JSON list, defaulting to empty when missing or invalid
    pub fn read_list<T: DeserializeOwned>(&self, key: &StorageKey) -> Vec<T> {
        self.read_json(key).unwrap_or_default()
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.read_raw(key).is_some()
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        key: &StorageKey,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut batch = Batch::new();
        batch.set_json(key, value)?;
        self.apply(batch)
    }

    pub fn remove(&self, key: &StorageKey) -> Result<(), StoreError> {
        self.backend.remove(&key.as_key())
    }

    /// Ids of every session that has an event log, whether or not it is still indexed
    pub fn event_log_ids(&self) -> Result<Vec<String>, StoreError> {
        let prefix = StorageKey::Events(String::new()).as_key();
        Ok(self
            .backend
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub fn apply(&self, batch: Batch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.backend.apply(batch.ops())
    }

    /// Write a raw string, bypassing JSON encoding (used to seed legacy data)
    pub fn write_raw(&self, key: &StorageKey, value: &str) -> Result<(), StoreError> {
        self.backend.set(&key.as_key(), value)
    }
}
