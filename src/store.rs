//! SQLite-backed key-value store for the editable address blob.
//!
//! One opaque string per key, mutated only by explicit editor writes.
//! Last write wins; there is no versioning or concurrent-write protection.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Current schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Thread-safe key-value store handle
pub struct KvStore {
    conn: Arc<Mutex<Connection>>,
}

impl KvStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open key-value store")?;

        // WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations()?;

        info!("Key-value store opened at {}", path.display());
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory key-value store")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < SCHEMA_VERSION {
            info!(
                "Running store migrations from v{} to v{}",
                current_version, SCHEMA_VERSION
            );

            if current_version < 1 {
                debug!("Applying migration v1: kv table");
                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS kv (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL,
                        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                    );

                    INSERT INTO schema_migrations (version) VALUES (1);
                    "#,
                )?;
            }
        }

        Ok(())
    }

    /// Read the value stored under a key, if any
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Overwrite the value stored under a key (last write wins)
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key. Missing keys are not an error.
    pub fn delete(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// One-time migration from a deprecated key name to the current one.
    ///
    /// Copies the legacy value only when the destination is absent or empty,
    /// then deletes the legacy key. Returns whether a value was copied.
    pub fn migrate_legacy(&self, legacy_key: &str, current_key: &str) -> Result<bool> {
        let legacy = self.get(legacy_key)?;
        let Some(legacy_value) = legacy else {
            return Ok(false);
        };

        let destination_empty = self
            .get(current_key)?
            .map(|v| v.is_empty())
            .unwrap_or(true);

        let copied = if destination_empty {
            self.put(current_key, &legacy_value)?;
            info!(
                from = legacy_key,
                to = current_key,
                "Migrated legacy key-value entry"
            );
            true
        } else {
            debug!(
                from = legacy_key,
                to = current_key,
                "Destination already populated, dropping legacy key"
            );
            false
        };

        self.delete(legacy_key)?;
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = KvStore::open_in_memory().unwrap();
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_put_get_overwrite() {
        let store = KvStore::open_in_memory().unwrap();
        store.put("ADD.txt", "1.2.3.4:443").unwrap();
        assert_eq!(store.get("ADD.txt").unwrap().as_deref(), Some("1.2.3.4:443"));

        store.put("ADD.txt", "5.6.7.8:80").unwrap();
        assert_eq!(store.get("ADD.txt").unwrap().as_deref(), Some("5.6.7.8:80"));
    }

    #[test]
    fn test_delete() {
        let store = KvStore::open_in_memory().unwrap();
        store.put("k", "v").unwrap();
        store.delete("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);

        // Deleting a missing key is fine
        store.delete("k").unwrap();
    }

    #[test]
    fn test_migrate_legacy_copies_once() {
        let store = KvStore::open_in_memory().unwrap();
        store.put("LINK.txt", "legacy-blob").unwrap();

        assert!(store.migrate_legacy("LINK.txt", "ADD.txt").unwrap());
        assert_eq!(store.get("ADD.txt").unwrap().as_deref(), Some("legacy-blob"));
        assert_eq!(store.get("LINK.txt").unwrap(), None);

        // Second run is a no-op
        assert!(!store.migrate_legacy("LINK.txt", "ADD.txt").unwrap());
    }

    #[test]
    fn test_migrate_legacy_keeps_populated_destination() {
        let store = KvStore::open_in_memory().unwrap();
        store.put("LINK.txt", "legacy-blob").unwrap();
        store.put("ADD.txt", "current-blob").unwrap();

        assert!(!store.migrate_legacy("LINK.txt", "ADD.txt").unwrap());
        assert_eq!(
            store.get("ADD.txt").unwrap().as_deref(),
            Some("current-blob")
        );
        // Legacy key is still removed
        assert_eq!(store.get("LINK.txt").unwrap(), None);
    }

    #[test]
    fn test_migrate_legacy_absent_source() {
        let store = KvStore::open_in_memory().unwrap();
        assert!(!store.migrate_legacy("LINK.txt", "ADD.txt").unwrap());
        assert_eq!(store.get("ADD.txt").unwrap(), None);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.db");

        {
            let store = KvStore::open(&path).unwrap();
            store.put("ADD.txt", "persisted").unwrap();
        }

        let store = KvStore::open(&path).unwrap();
        assert_eq!(store.get("ADD.txt").unwrap().as_deref(), Some("persisted"));
    }
}
