//! Key/value cache store implementation

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};

use super::Database;

/// Trait for durable key/value persistence of entities.
///
/// Values are the JSON-serialized fields of an entity, keyed by its
/// identifier. One reserved key ([`super::CREDENTIAL_KEY`]) holds the sync
/// credential and must be skipped when enumerating entities.
pub trait CacheStore: Send + Sync {
    /// Read a value, `None` when the key is absent
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Create or overwrite a value
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing an absent key is a no-op
    fn remove(&self, key: &str) -> Result<()>;

    /// List all stored keys, reserved ones included
    fn keys(&self) -> Result<Vec<String>>;
}

/// `SQLite` implementation of `CacheStore`
pub struct SqliteCacheStore {
    db: Mutex<Database>,
}

impl SqliteCacheStore {
    /// Open the cache at the given filesystem path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open(path)?),
        })
    }

    /// Open an in-memory cache (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            db: Mutex::new(Database::open_in_memory()?),
        })
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| Error::Cache("cache mutex poisoned".to_string()))
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db()?;
        let value = db
            .connection()
            .query_row("SELECT value FROM cache WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let db = self.db()?;
        db.connection().execute(
            "INSERT INTO cache (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let db = self.db()?;
        db.connection()
            .execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let db = self.db()?;
        let conn = db.connection();
        let mut stmt = conn.prepare("SELECT key FROM cache ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use crate::cache::CREDENTIAL_KEY;

    use super::*;

    fn setup() -> SqliteCacheStore {
        SqliteCacheStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_set_and_get() {
        let cache = setup();
        cache.set("42", r#"{"name":"Trek"}"#).unwrap();

        let value = cache.get("42").unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"name":"Trek"}"#));
        assert_eq!(cache.get("missing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let cache = setup();
        cache.set("42", "old").unwrap();
        cache.set("42", "new").unwrap();

        assert_eq!(cache.get("42").unwrap().as_deref(), Some("new"));
        assert_eq!(cache.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let cache = setup();
        cache.set("42", "value").unwrap();
        cache.remove("42").unwrap();
        cache.remove("42").unwrap();

        assert_eq!(cache.get("42").unwrap(), None);
    }

    #[test]
    fn test_keys_include_reserved_key() {
        let cache = setup();
        cache.set(CREDENTIAL_KEY, "secret").unwrap();
        cache.set("42", "value").unwrap();

        let keys = cache.keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&CREDENTIAL_KEY.to_string()));
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("cache.db");

        {
            let cache = SqliteCacheStore::open(&path).unwrap();
            cache.set("42", "persisted").unwrap();
        }

        let cache = SqliteCacheStore::open(&path).unwrap();
        assert_eq!(cache.get("42").unwrap().as_deref(), Some("persisted"));
    }
}
