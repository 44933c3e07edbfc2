use crate::model::CachedEntry;
use async_trait::async_trait;
use std::fmt::Debug;

pub mod sqlite;

pub use sqlite::SqliteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to serialize cached record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to create cache directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Store operation abandoned by its caller")]
    Abandoned,
}

/// Persistent cache of fetched weather.
#[async_trait]
pub trait WeatherStore: Send + Sync + Debug {
    /// Insert an entry, replacing any row with the same [`CachedEntry::cache_key`].
    async fn insert(&self, entry: CachedEntry) -> Result<(), StoreError>;

    /// Find a row whose stored query contains `query` or is contained in it.
    /// Blank queries never match.
    async fn lookup_by_city(&self, query: &str) -> Result<Option<CachedEntry>, StoreError>;

    /// Find a row whose coordinates exactly equal `(lat, lon)`.
    async fn lookup_by_coordinates(
        &self,
        lat: Option<f64>,
        lon: Option<f64>,
    ) -> Result<Option<CachedEntry>, StoreError>;

    /// Delete every row.
    async fn clear(&self) -> Result<(), StoreError>;
}
