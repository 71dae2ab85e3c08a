//! Storage layer for meter state.
//!
//! Provides persistence for coordinator state blobs using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved to another thread but not shared between threads
//! without external synchronization. Separate processes serialize their
//! updates with a lock file (see `fm-cli`).
//!
//! # Schema
//!
//! One row per coordinator in `meter_state`, keyed by the instance name.
//! The `data` column holds the JSON blob produced by the coordinator; this
//! crate never looks inside it.
//!
//! Timestamps are stored as TEXT in RFC 3339 format (e.g., `2024-01-15T10:30:00Z`).

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use fm_core::{StateStore, StoreError};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored blob is not valid JSON.
    #[error("invalid state data for {key}: {source}")]
    InvalidData {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored `updated_at` could not be parsed.
    #[error("invalid timestamp for {key}: {timestamp}")]
    TimestampParse {
        key: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A persisted state blob.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord {
    pub key: String,
    pub data: Value,
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meter_state (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Loads the blob stored under `key`, if any.
    pub fn load_state(&self, key: &str) -> Result<Option<Value>, DbError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM meter_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        data.map(|data| {
            serde_json::from_str(&data).map_err(|source| DbError::InvalidData {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Stores `data` under `key`, replacing any previous blob.
    pub fn save_state(&mut self, key: &str, data: &Value) -> Result<(), DbError> {
        let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.conn.execute(
            "
            INSERT INTO meter_state (key, data, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            ",
            params![key, data.to_string(), updated_at],
        )?;
        tracing::debug!(key, "saved meter state");
        Ok(())
    }

    /// Lists all stored blobs ordered by key.
    pub fn list_states(&self) -> Result<Vec<StateRecord>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, data, updated_at FROM meter_state ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut states = Vec::new();
        for row in rows {
            let (key, data, updated_at) = row?;
            let data = serde_json::from_str(&data).map_err(|source| DbError::InvalidData {
                key: key.clone(),
                source,
            })?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|source| DbError::TimestampParse {
                    key: key.clone(),
                    timestamp: updated_at.clone(),
                    source,
                })?
                .with_timezone(&Utc);
            states.push(StateRecord {
                key,
                data,
                updated_at,
            });
        }
        Ok(states)
    }
}

/// A [`StateStore`] persisting one coordinator under a fixed key.
pub struct DbStore {
    db: Database,
    key: String,
}

impl DbStore {
    pub fn new(db: Database, key: impl Into<String>) -> Self {
        Self {
            db,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl StateStore for DbStore {
    fn load(&self) -> Result<Option<Value>, StoreError> {
        self.db
            .load_state(&self.key)
            .map_err(|err| StoreError::Backend(Box::new(err)))
    }

    fn save(&mut self, data: &Value) -> Result<(), StoreError> {
        self.db
            .save_state(&self.key, data)
            .map_err(|err| StoreError::Backend(Box::new(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        stmt.query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info")
            .map(|row| row.expect("column name"))
            .collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "meter_state"),
            vec!["key", "data", "updated_at"]
        );
    }

    #[test]
    fn missing_key_loads_none() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_state("office").unwrap(), None);
    }

    #[test]
    fn save_replaces_previous_blob() {
        let mut db = Database::open_in_memory().unwrap();
        db.save_state("office", &json!({"status": "inactive"})).unwrap();
        db.save_state("office", &json!({"status": "measuring", "version": 1}))
            .unwrap();
        db.save_state("garage", &json!({})).unwrap();

        assert_eq!(
            db.load_state("office").unwrap(),
            Some(json!({"status": "measuring", "version": 1}))
        );

        let states = db.list_states().unwrap();
        let keys: Vec<_> = states.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["garage", "office"]);
        assert!(states[1].updated_at <= Utc::now());
    }

    #[test]
    fn corrupt_blob_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO meter_state (key, data, updated_at) VALUES ('office', '{oops', '2024-01-15T10:30:00Z')",
                [],
            )
            .unwrap();

        let err = db.load_state("office").unwrap_err();
        assert!(matches!(err, DbError::InvalidData { key, .. } if key == "office"));
    }

    #[test]
    fn state_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("fm.db");

        let mut store = DbStore::new(Database::open(&path).unwrap(), "office");
        store.save(&json!({"version": 1})).unwrap();
        drop(store);

        let store = DbStore::new(Database::open(&path).unwrap(), "office");
        assert_eq!(store.key(), "office");
        assert_eq!(store.load().unwrap(), Some(json!({"version": 1})));
    }

    #[test]
    fn db_store_reports_backend_errors() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO meter_state (key, data, updated_at) VALUES ('office', 'nope', '2024-01-15T10:30:00Z')",
                [],
            )
            .unwrap();
        let store = DbStore::new(db, "office");
        assert!(matches!(store.load(), Err(StoreError::Backend(_))));
    }
}
