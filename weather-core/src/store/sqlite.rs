//! SQLite-backed weather cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::{fs, path::Path, sync::Arc};

use crate::model::{CachedEntry, WeatherRecord};

use super::{StoreError, WeatherStore};

const SELECT_COLUMNS: &str = "SELECT query, record, city_name, latitude, longitude, icon, \
                              temperature, condition, cached_at FROM weather";

/// SQLite cache holding one row per city query or coordinate pair.
///
/// Statements run on the blocking pool; the connection is shared behind a mutex.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the cache database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open a transient in-memory cache.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather (
                cache_key TEXT PRIMARY KEY,
                query TEXT,
                record TEXT NOT NULL,
                city_name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                icon TEXT,
                temperature REAL NOT NULL,
                condition TEXT,
                cached_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_weather_coord ON weather(latitude, longitude);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` on the blocking pool once the connection is free.
    ///
    /// If the awaiting future is dropped before the connection is acquired,
    /// `f` is skipped and nothing reaches the database.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let caller = Arc::new(());
        let alive = Arc::downgrade(&caller);

        let result = tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            if alive.upgrade().is_none() {
                tracing::debug!("store operation abandoned before it started");
                return Err(StoreError::Abandoned);
            }
            f(&conn)
        })
        .await?;

        drop(caller);
        result
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<CachedEntry> {
        let record_json: String = row.get(1)?;
        let record: WeatherRecord = serde_json::from_str(&record_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let cached_at_ms: i64 = row.get(8)?;

        Ok(CachedEntry {
            record,
            query: row.get(0)?,
            city_name: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            icon: row.get(5)?,
            temperature: row.get(6)?,
            condition: row.get(7)?,
            cached_at: millis_to_utc(cached_at_ms).unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl WeatherStore for SqliteStore {
    async fn insert(&self, entry: CachedEntry) -> Result<(), StoreError> {
        let record_json = serde_json::to_string(&entry.record)?;
        let key = entry.cache_key();

        self.run(move |conn| {
            conn.execute(
                r#"
                INSERT OR REPLACE INTO weather
                (cache_key, query, record, city_name, latitude, longitude,
                 icon, temperature, condition, cached_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    key,
                    entry.query,
                    record_json,
                    entry.city_name,
                    entry.latitude,
                    entry.longitude,
                    entry.icon,
                    entry.temperature,
                    entry.condition,
                    entry.cached_at.timestamp_millis(),
                ],
            )?;
            tracing::debug!(key = %key, "cached weather entry");
            Ok(())
        })
        .await
    }

    async fn lookup_by_city(&self, query: &str) -> Result<Option<CachedEntry>, StoreError> {
        if query.is_empty() {
            return Ok(None);
        }
        let query = query.to_owned();

        self.run(move |conn| {
            let sql = format!(
                "{SELECT_COLUMNS}
                 WHERE query IS NOT NULL AND trim(query) <> ''
                   AND (instr(lower(?1), lower(query)) > 0
                        OR instr(lower(query), lower(?1)) > 0)
                 ORDER BY cached_at DESC
                 LIMIT 1"
            );
            let entry = conn
                .query_row(&sql, params![query], Self::row_to_entry)
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn lookup_by_coordinates(
        &self,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Option<CachedEntry>, StoreError> {
        let (Some(lat), Some(lon)) = (lat, lon) else {
            return Ok(None);
        };

        self.run(move |conn| {
            let sql = format!(
                "{SELECT_COLUMNS}
                 WHERE latitude = ?1 AND longitude = ?2
                 ORDER BY cached_at DESC
                 LIMIT 1"
            );
            let entry = conn
                .query_row(&sql, params![lat, lon], Self::row_to_entry)
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.run(|conn| {
            let removed = conn.execute("DELETE FROM weather", [])?;
            tracing::debug!(removed, "cleared weather cache");
            Ok(())
        })
        .await
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
