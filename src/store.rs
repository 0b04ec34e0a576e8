//! Persistent search cache and favorites.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;
use crate::models::{CachedSearch, Favorite, Offer, QueryKey, Source};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS favorites (
    favorite_id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    source_offer_id TEXT NOT NULL,
    offer_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE(source, source_offer_id)
);

CREATE TABLE IF NOT EXISTS search_cache (
    query_key TEXT PRIMARY KEY,
    payload_json TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
";

/// Storage contract used by the search orchestrator and favorites service
pub trait Store: Send + Sync {
    /// Cached payload for `key` if it was written within `ttl`
    fn get_cached_search(&self, key: &QueryKey, ttl: Duration) -> Result<Option<CachedSearch>, StoreError>;

    /// Insert or overwrite the payload for `key`
    fn put_cached_search(&self, key: &QueryKey, payload: &CachedSearch) -> Result<(), StoreError>;

    /// Insert a favorite, or overwrite the stored offer of an existing one.
    /// Returns the favorite id either way.
    fn add_favorite(&self, source: Source, source_offer_id: &str, offer: &Offer) -> Result<i64, StoreError>;

    /// True when a row was removed
    fn delete_favorite(&self, favorite_id: i64) -> Result<bool, StoreError>;

    fn find_favorite_by_offer(&self, source: Source, source_offer_id: &str) -> Result<Option<i64>, StoreError>;

    /// All favorites, newest first
    fn list_favorites(&self) -> Result<Vec<Favorite>, StoreError>;
}

/// SQLite-backed [`Store`]. One connection, serialized behind a mutex.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!("Opening store at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn put_cached_search_at(
        &self,
        key: &QueryKey,
        payload: &CachedSearch,
        fetched_at: i64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(payload)?;
        self.conn.lock().execute(
            "INSERT INTO search_cache(query_key, payload_json, fetched_at)
             VALUES(?1, ?2, ?3)
             ON CONFLICT(query_key) DO UPDATE SET
                 payload_json = excluded.payload_json,
                 fetched_at = excluded.fetched_at",
            params![key.as_str(), json, fetched_at],
        )?;
        Ok(())
    }
}

impl Store for SqliteStore {
    fn get_cached_search(&self, key: &QueryKey, ttl: Duration) -> Result<Option<CachedSearch>, StoreError> {
        let row: Option<(String, i64)> = self
            .conn
            .lock()
            .query_row(
                "SELECT payload_json, fetched_at FROM search_cache WHERE query_key = ?1",
                params![key.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, fetched_at)) = row else {
            return Ok(None);
        };
        let oldest = Utc::now().timestamp() - ttl.as_secs().max(1) as i64;
        if fetched_at < oldest {
            debug!("Cache entry {} is stale", key);
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn put_cached_search(&self, key: &QueryKey, payload: &CachedSearch) -> Result<(), StoreError> {
        self.put_cached_search_at(key, payload, Utc::now().timestamp())
    }

    fn add_favorite(&self, source: Source, source_offer_id: &str, offer: &Offer) -> Result<i64, StoreError> {
        let json = serde_json::to_string(offer)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO favorites(source, source_offer_id, offer_json, created_at)
             VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(source, source_offer_id) DO UPDATE SET
                 offer_json = excluded.offer_json",
            params![source.as_str(), source_offer_id, json, Utc::now().timestamp()],
        )?;
        let id = conn.query_row(
            "SELECT favorite_id FROM favorites WHERE source = ?1 AND source_offer_id = ?2",
            params![source.as_str(), source_offer_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn delete_favorite(&self, favorite_id: i64) -> Result<bool, StoreError> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM favorites WHERE favorite_id = ?1", params![favorite_id])?;
        Ok(removed > 0)
    }

    fn find_favorite_by_offer(&self, source: Source, source_offer_id: &str) -> Result<Option<i64>, StoreError> {
        let id = self
            .conn
            .lock()
            .query_row(
                "SELECT favorite_id FROM favorites WHERE source = ?1 AND source_offer_id = ?2",
                params![source.as_str(), source_offer_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn list_favorites(&self) -> Result<Vec<Favorite>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT favorite_id, offer_json, created_at FROM favorites
             ORDER BY created_at DESC, favorite_id DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(favorite_id, json, created_at)| {
                Ok(Favorite {
                    favorite_id,
                    created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
                    offer: serde_json::from_str(&json)?,
                })
            })
            .collect()
    }
}
