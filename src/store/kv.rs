//! Key-value backends for persisted client state.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Synchronous, best-effort key-value storage.
///
/// Failures are logged and swallowed: a failed read is a miss and a failed
/// write leaves the previous value in place. Callers fall back to the network.
pub trait KeyValueStore: Send + Sync {
  fn get(&self, key: &str) -> Option<String>;

  fn set(&self, key: &str, value: &str);

  fn remove(&self, key: &str);
}

/// In-process storage, used for `--no-cache` sessions and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Option<String> {
    self.entries.lock().ok()?.get(key).cloned()
  }

  fn set(&self, key: &str, value: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(key.to_string(), value.to_string());
    }
  }

  fn remove(&self, key: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.remove(key);
    }
  }
}

/// SQLite-backed storage that survives restarts.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SqliteStore {
  /// Open or create the store at the default location.
  pub fn open() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create the store at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open state database at {}: {}", path.display(), e))?;

    conn
      .execute_batch(KV_SCHEMA)
      .map_err(|e| eyre!("Failed to run state migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = crate::config::data_dir()?;
    Ok(data_dir.join("state.db"))
  }
}

impl KeyValueStore for SqliteStore {
  fn get(&self, key: &str) -> Option<String> {
    let conn = self.conn.lock().ok()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .unwrap_or_else(|e| {
        warn!(key, error = %e, "state read failed");
        None
      })
  }

  fn set(&self, key: &str, value: &str) {
    let Ok(conn) = self.conn.lock() else {
      warn!(key, "state lock poisoned, dropping write");
      return;
    };
    if let Err(e) = conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    ) {
      warn!(key, error = %e, "state write failed");
    }
  }

  fn remove(&self, key: &str) {
    let Ok(conn) = self.conn.lock() else {
      warn!(key, "state lock poisoned, dropping remove");
      return;
    };
    if let Err(e) = conn.execute("DELETE FROM kv_store WHERE key = ?", params![key]) {
      warn!(key, error = %e, "state remove failed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn exercise(store: &dyn KeyValueStore) {
    assert_eq!(store.get("a"), None);
    store.set("a", "1");
    assert_eq!(store.get("a").as_deref(), Some("1"));
    store.set("a", "2");
    assert_eq!(store.get("a").as_deref(), Some("2"));
    store.remove("a");
    assert_eq!(store.get("a"), None);
    // Removing a missing key is a no-op
    store.remove("a");
  }

  #[test]
  fn test_memory_store() {
    exercise(&MemoryStore::new());
  }

  #[test]
  fn test_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&SqliteStore::open_at(&dir.path().join("state.db")).unwrap());
  }

  #[test]
  fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.db");

    SqliteStore::open_at(&path).unwrap().set("k", "v");
    let reopened = SqliteStore::open_at(&path).unwrap();
    assert_eq!(reopened.get("k").as_deref(), Some("v"));
  }
}
