//! Key-value cache: SQLite-backed rows plus [`PersistentCache`] adapters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tokio::sync::RwLock;

use lifeline_shared::capabilities::PersistentCache;
use lifeline_shared::error::CacheError;

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    /// Fetch the value stored under `key`.
    pub fn cache_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM cache_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Insert or overwrite the value stored under `key`.
    pub fn cache_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO cache_entries (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn cache_delete(&self, key: &str) -> Result<bool> {
        let n = self
            .conn()
            .execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }
}

/// [`PersistentCache`] over a shared [`Database`]. Queries run on the blocking
/// pool.
#[derive(Clone)]
pub struct SqliteCache {
    db: Arc<Mutex<Database>>,
}

impl SqliteCache {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let db = db.lock().unwrap_or_else(PoisonError::into_inner);
            f(&*db)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl PersistentCache for SqliteCache {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        let key = key.to_string();
        Ok(self.with_db(move |db| db.cache_get(&key)).await?)
    }

    async fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
        let key = key.to_string();
        let value = value.to_string();
        Ok(self.with_db(move |db| db.cache_set(&key, &value)).await?)
    }
}

/// Process-local cache for tests and nodes running without a database.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PersistentCache for MemoryCache {
    async fn get(&self, key: &str) -> std::result::Result<Option<String>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> std::result::Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cache.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_set_overwrites() {
        let (_dir, db) = open_temp();
        assert_eq!(db.cache_get("feed").unwrap(), None);

        db.cache_set("feed", "one").unwrap();
        db.cache_set("feed", "two").unwrap();
        assert_eq!(db.cache_get("feed").unwrap().as_deref(), Some("two"));

        assert!(db.cache_delete("feed").unwrap());
        assert!(!db.cache_delete("feed").unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        let cache = SqliteCache::new(Arc::new(Mutex::new(Database::open_at(&path).unwrap())));
        cache.set("EMERGENCY_FEED_CACHE", r#"{"records":[]}"#).await.unwrap();
        drop(cache);

        let cache = SqliteCache::new(Arc::new(Mutex::new(Database::open_at(&path).unwrap())));
        assert_eq!(
            cache.get("EMERGENCY_FEED_CACHE").await.unwrap().as_deref(),
            Some(r#"{"records":[]}"#)
        );
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache() {
        let cache = MemoryCache::new();
        assert!(cache.is_empty().await);
        cache.set("k", "v").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(cache.len().await, 1);
    }
}
