//! Cache-first resolution of weather queries.
//!
//! A resolution answers from the local store when it can and otherwise
//! fetches from the remote client, writing the result through to the store
//! before reporting success. Each resolution emits `Loading(true)` followed by
//! exactly one terminal `Success` or `Error` to a single [`Resolution`].

use std::sync::Arc;

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    client::{ClientError, WeatherClient},
    model::{
        CachedEntry, LOAD_FAILED_MESSAGE, NOT_FOUND_MESSAGE, Resource, SAVE_FAILED_MESSAGE,
        WeatherQuery, WeatherRecord,
    },
    store::WeatherStore,
};

pub type WeatherResource = Resource<WeatherRecord>;

/// Stateless orchestration over a [`WeatherClient`] and a [`WeatherStore`].
#[derive(Debug, Clone)]
pub struct WeatherResolver {
    client: Arc<dyn WeatherClient>,
    store: Arc<dyn WeatherStore>,
}

impl WeatherResolver {
    pub fn new(client: Arc<dyn WeatherClient>, store: Arc<dyn WeatherStore>) -> Self {
        Self { client, store }
    }

    pub fn resolve_by_city(&self, city_name: impl Into<String>) -> Resolution {
        self.resolve(WeatherQuery::ByCity(city_name.into()))
    }

    pub fn resolve_by_coordinates(&self, lat: Option<f64>, lon: Option<f64>) -> Resolution {
        self.resolve(WeatherQuery::ByCoordinates { lat, lon })
    }

    /// Start resolving `query` on the current tokio runtime.
    pub fn resolve(&self, query: WeatherQuery) -> Resolution {
        let (tx, rx) = mpsc::channel(2);
        let resolver = self.clone();
        let task = tokio::spawn(async move { resolver.run(query, tx).await });

        Resolution { rx, task }
    }

    async fn run(self, query: WeatherQuery, tx: mpsc::Sender<WeatherResource>) {
        if tx.send(Resource::Loading(true)).await.is_err() {
            return;
        }

        let outcome = self.resolve_outcome(&query).await;
        // A closed receiver means the caller stopped listening.
        let _ = tx.send(outcome).await;
    }

    async fn resolve_outcome(&self, query: &WeatherQuery) -> WeatherResource {
        if let Some(cached) = self.cached(query).await {
            tracing::debug!(%query, "cache hit");
            return Resource::Success(cached.record);
        }

        tracing::debug!(%query, "cache miss, fetching");
        let record = match self.fetch(query).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(%query, error = %err, "weather fetch failed");
                return Resource::Error(client_error_message(&err).to_string());
            }
        };

        let query_text = match query {
            WeatherQuery::ByCity(name) => Some(name.clone()),
            WeatherQuery::ByCoordinates { .. } => None,
        };

        if let Err(err) = self.store.insert(CachedEntry::new(record.clone(), query_text)).await {
            tracing::warn!(%query, error = %err, "failed to cache fetched weather");
            return Resource::Error(SAVE_FAILED_MESSAGE.to_string());
        }

        Resource::Success(record)
    }

    /// Cached entry that counts as a hit for `query`. A failing store lookup
    /// counts as a miss.
    async fn cached(&self, query: &WeatherQuery) -> Option<CachedEntry> {
        let lookup = match query {
            WeatherQuery::ByCity(name) => self.store.lookup_by_city(name).await,
            WeatherQuery::ByCoordinates { lat, lon } => {
                self.store.lookup_by_coordinates(*lat, *lon).await
            }
        };

        let entry = match lookup {
            Ok(entry) => entry?,
            Err(err) => {
                tracing::warn!(%query, error = %err, "cache lookup failed");
                return None;
            }
        };

        match query {
            // A blank city never counts as a hit, whatever the store matched.
            WeatherQuery::ByCity(name) if name.trim().is_empty() => None,
            _ => Some(entry),
        }
    }

    async fn fetch(&self, query: &WeatherQuery) -> Result<WeatherRecord, ClientError> {
        match query {
            WeatherQuery::ByCity(name) => self.client.fetch_by_city(name).await,
            WeatherQuery::ByCoordinates { lat, lon } => {
                self.client.fetch_by_coordinates(*lat, *lon).await
            }
        }
    }
}

fn client_error_message(err: &ClientError) -> &'static str {
    if err.is_not_found() {
        NOT_FOUND_MESSAGE
    } else {
        LOAD_FAILED_MESSAGE
    }
}

/// Outcomes of one resolution, for a single consumer.
///
/// Dropping it cancels the resolution, including any in-flight request. A
/// cache write still waiting for the store connection is abandoned; one that
/// has already started completes.
#[derive(Debug)]
pub struct Resolution {
    rx: mpsc::Receiver<WeatherResource>,
    task: JoinHandle<()>,
}

impl Resolution {
    /// Next outcome, or `None` once the terminal outcome has been taken.
    pub async fn next(&mut self) -> Option<WeatherResource> {
        self.rx.recv().await
    }

    /// Wait for the terminal outcome, skipping `Loading`.
    pub async fn outcome(mut self) -> WeatherResource {
        while let Some(resource) = self.next().await {
            if resource.is_terminal() {
                return resource;
            }
        }
        Resource::Error(LOAD_FAILED_MESSAGE.to_string())
    }

    /// Every outcome in emission order.
    pub async fn collect(mut self) -> Vec<WeatherResource> {
        let mut emitted = Vec::with_capacity(2);
        while let Some(resource) = self.next().await {
            emitted.push(resource);
        }
        emitted
    }
}

impl Drop for Resolution {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Coordinates, fixtures::london},
        store::{SqliteStore, StoreError},
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[derive(Debug, Clone)]
    enum Reply {
        Record(WeatherRecord),
        NotFound,
        Transport,
        Protocol,
        Hang,
    }

    #[derive(Debug)]
    struct FakeClient {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeClient {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        async fn respond(&self) -> Result<WeatherRecord, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Reply::Record(record) => Ok(record.clone()),
                Reply::NotFound => Err(ClientError::NotFound {
                    status: 404,
                    body: "Not found".into(),
                }),
                Reply::Transport => {
                    Err(ClientError::transport(std::io::Error::other("Network error")))
                }
                Reply::Protocol => Err(ClientError::ProtocolFailure("bad json".into())),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ClientError::ProtocolFailure("unreachable".into()))
                }
            }
        }
    }

    #[async_trait]
    impl WeatherClient for FakeClient {
        async fn fetch_by_city(&self, _name: &str) -> Result<WeatherRecord, ClientError> {
            self.respond().await
        }

        async fn fetch_by_coordinates(
            &self,
            _lat: Option<f64>,
            _lon: Option<f64>,
        ) -> Result<WeatherRecord, ClientError> {
            self.respond().await
        }
    }

    /// Real SQLite store that records inserts and can be told to fail.
    #[derive(Debug)]
    struct RecordingStore {
        inner: SqliteStore,
        inserts: Mutex<Vec<CachedEntry>>,
        fail_inserts: bool,
        fail_lookups: bool,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                inner: SqliteStore::in_memory().expect("in-memory store"),
                inserts: Mutex::new(Vec::new()),
                fail_inserts: false,
                fail_lookups: false,
            }
        }

        fn inserts(&self) -> Vec<CachedEntry> {
            self.inserts.lock().clone()
        }

        fn broken() -> StoreError {
            StoreError::Io(std::io::Error::other("disk I/O error"))
        }
    }

    #[async_trait]
    impl WeatherStore for RecordingStore {
        async fn insert(&self, entry: CachedEntry) -> Result<(), StoreError> {
            if self.fail_inserts {
                return Err(Self::broken());
            }
            self.inserts.lock().push(entry.clone());
            self.inner.insert(entry).await
        }

        async fn lookup_by_city(&self, query: &str) -> Result<Option<CachedEntry>, StoreError> {
            if self.fail_lookups {
                return Err(Self::broken());
            }
            self.inner.lookup_by_city(query).await
        }

        async fn lookup_by_coordinates(
            &self,
            lat: Option<f64>,
            lon: Option<f64>,
        ) -> Result<Option<CachedEntry>, StoreError> {
            if self.fail_lookups {
                return Err(Self::broken());
            }
            self.inner.lookup_by_coordinates(lat, lon).await
        }

        async fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear().await
        }
    }

    fn resolver(client: &Arc<FakeClient>, store: &Arc<RecordingStore>) -> WeatherResolver {
        WeatherResolver::new(client.clone(), store.clone())
    }

    #[tokio::test]
    async fn cached_city_is_served_without_remote_call() {
        let client = FakeClient::new(Reply::Transport);
        let store = Arc::new(RecordingStore::new());
        store.inner.insert(CachedEntry::new(london(), Some("london".into()))).await.unwrap();

        let emitted = resolver(&client, &store).resolve_by_city("london").collect().await;

        assert_eq!(emitted, vec![Resource::Loading(true), Resource::Success(london())]);
        assert_eq!(client.calls(), 0);
        assert!(store.inserts().is_empty());
    }

    #[tokio::test]
    async fn miss_fetches_once_and_writes_through() {
        let client = FakeClient::new(Reply::Record(london()));
        let store = Arc::new(RecordingStore::new());

        let emitted = resolver(&client, &store).resolve_by_city("london").collect().await;

        assert_eq!(emitted, vec![Resource::Loading(true), Resource::Success(london())]);
        assert_eq!(client.calls(), 1);

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].record, london());
        assert_eq!(inserts[0].query.as_deref(), Some("london"));
        assert!(store.inner.lookup_by_city("london").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn not_found_emits_error_without_insert() {
        let client = FakeClient::new(Reply::NotFound);
        let store = Arc::new(RecordingStore::new());

        let emitted = resolver(&client, &store).resolve_by_city("Berlin").collect().await;

        assert_eq!(
            emitted,
            vec![Resource::Loading(true), Resource::Error("Not found".to_string())]
        );
        assert!(store.inserts().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_emits_load_error_without_insert() {
        let client = FakeClient::new(Reply::Transport);
        let store = Arc::new(RecordingStore::new());

        let emitted = resolver(&client, &store).resolve_by_city("Tokyo").collect().await;

        assert_eq!(
            emitted,
            vec![Resource::Loading(true), Resource::Error("Couldn't load data".to_string())]
        );
        assert!(store.inserts().is_empty());
    }

    #[tokio::test]
    async fn protocol_failure_emits_load_error() {
        let client = FakeClient::new(Reply::Protocol);
        let store = Arc::new(RecordingStore::new());

        let outcome = resolver(&client, &store).resolve_by_city("Oslo").outcome().await;

        assert_eq!(outcome.message(), Some(LOAD_FAILED_MESSAGE));
    }

    #[tokio::test]
    async fn blank_city_is_never_a_hit() {
        let client = FakeClient::new(Reply::NotFound);
        let store = Arc::new(RecordingStore::new());
        store.inner.insert(CachedEntry::new(london(), Some("london".into()))).await.unwrap();

        let outcome = resolver(&client, &store).resolve_by_city("   ").outcome().await;

        assert!(outcome.is_error());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn coordinate_hit_requires_both_coordinates() {
        let client = FakeClient::new(Reply::NotFound);
        let store = Arc::new(RecordingStore::new());
        store.inner.insert(CachedEntry::new(london(), None)).await.unwrap();
        let resolver = resolver(&client, &store);

        let hit = resolver.resolve_by_coordinates(Some(6.2), Some(6.9)).outcome().await;
        assert_eq!(hit, Resource::Success(london()));
        assert_eq!(client.calls(), 0);

        let miss = resolver.resolve_by_coordinates(Some(6.2), Some(1.0)).outcome().await;
        assert!(miss.is_error());
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn coordinate_fetch_persists_without_query() {
        let mut record = london();
        record.coordinates = Coordinates {
            lat: 51.5074,
            lon: -0.1278,
        };
        let client = FakeClient::new(Reply::Record(record.clone()));
        let store = Arc::new(RecordingStore::new());

        let emitted = resolver(&client, &store)
            .resolve_by_coordinates(Some(51.5074), Some(-0.1278))
            .collect()
            .await;

        assert_eq!(emitted, vec![Resource::Loading(true), Resource::Success(record)]);
        let inserts = store.inserts();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].query.is_none());
    }

    #[tokio::test]
    async fn repeated_city_resolution_hits_cache() {
        let client = FakeClient::new(Reply::Record(london()));
        let store = Arc::new(RecordingStore::new());
        let resolver = resolver(&client, &store);

        let first = resolver.resolve_by_city("London").outcome().await;
        let second = resolver.resolve_by_city("London").outcome().await;

        assert_eq!(first, second);
        assert_eq!(client.calls(), 1);
        assert_eq!(store.inserts().len(), 1);
    }

    #[tokio::test]
    async fn failed_lookup_falls_through_to_remote() {
        let client = FakeClient::new(Reply::Record(london()));
        let store = Arc::new(RecordingStore {
            fail_lookups: true,
            ..RecordingStore::new()
        });

        let outcome = resolver(&client, &store).resolve_by_city("london").outcome().await;

        assert_eq!(outcome, Resource::Success(london()));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn failed_insert_is_reported_as_save_error() {
        let client = FakeClient::new(Reply::Record(london()));
        let store = Arc::new(RecordingStore {
            fail_inserts: true,
            ..RecordingStore::new()
        });

        let outcome = resolver(&client, &store).resolve_by_city("london").outcome().await;

        assert_eq!(outcome, Resource::Error(SAVE_FAILED_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn dropping_resolution_cancels_fetch() {
        let client = FakeClient::new(Reply::Hang);
        let store = Arc::new(RecordingStore::new());

        let mut resolution = resolver(&client, &store).resolve_by_city("Lima");
        assert_eq!(resolution.next().await, Some(Resource::Loading(true)));

        // wait until the fake client is actually awaiting its reply
        while client.calls() == 0 {
            tokio::task::yield_now().await;
        }
        drop(resolution);
        tokio::task::yield_now().await;

        assert!(store.inserts().is_empty());
        assert!(store.inner.lookup_by_city("Lima").await.unwrap().is_none());
    }
}
