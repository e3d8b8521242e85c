//! Local key-value index mapping content hash to blob location.
//!
//! Outside the relational store this map is the sole authority for
//! "does this content already exist". A connection is opened per
//! logical operation and closed immediately after, so no long-lived
//! handle is held across requests; SQLite in WAL mode allows concurrent
//! readers alongside the single writer, which the engine serializes
//! itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{error, warn};

/// Errors from key-index operations.
///
/// "Key not found" is not an error; reads return `Ok(None)` for it.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("key index storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// A stored index value: either a plain string or a JSON-encoded
/// structured value.
///
/// The distinction on read is a best-effort content sniff ("does this
/// parse as a JSON object?"), not a type tag; a plain string that
/// happens to look like a JSON object will come back structured.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexValue {
    Text(String),
    Json(serde_json::Value),
}

impl IndexValue {
    /// Serialize for storage: structured values are JSON-encoded.
    fn encode(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// Sniff a raw stored string back into a value.
    fn decode(raw: String) -> Self {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) {
                if value.is_object() {
                    return Self::Json(value);
                }
            }
        }
        Self::Text(raw)
    }

    /// The value as a plain string, JSON-encoding structured values.
    pub fn as_text(&self) -> String {
        self.encode()
    }
}

impl From<String> for IndexValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for IndexValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for IndexValue {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

/// Persistent key-value index; one SQLite file, opened per call.
#[derive(Debug, Clone)]
pub struct KeyIndex {
    path: PathBuf,
}

impl KeyIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Database file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(conn)
    }

    /// Whether a value is stored under `key`.
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Fetch the value under `key`. A missing key is an expected outcome:
    /// logged at warn level and returned as `Ok(None)`.
    pub fn get(&self, key: &str) -> Result<Option<IndexValue>> {
        let conn = self.connect()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| {
                error!("key index get [key: {}] error: {}", key, err);
                err
            })?;

        match raw {
            Some(raw) => Ok(Some(IndexValue::decode(raw))),
            None => {
                warn!("key index has no key '{}'", key);
                Ok(None)
            }
        }
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &str, value: impl Into<IndexValue>) -> Result<()> {
        let conn = self.connect()?;
        let encoded = value.into().encode();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, encoded],
        )
        .map_err(|err| {
            error!("key index put [key: {}] error: {}", key, err);
            err
        })?;
        Ok(())
    }

    /// Remove the entry under `key`. Removing an absent key succeeds.
    pub fn delete(&self, key: &str) -> Result<()> {
        let conn = self.connect()?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|err| {
                error!("key index delete [key: {}] error: {}", key, err);
                err
            })?;
        Ok(())
    }

    /// Destructive full wipe of every entry. Deliberately a separate,
    /// explicitly named operation rather than a flag on [`delete`](Self::delete).
    pub fn clear_all(&self) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM kv", []).map_err(|err| {
            error!("key index clear_all error: {}", err);
            err
        })?;
        warn!("key index wiped, {} entries removed", removed);
        Ok(removed)
    }
}
