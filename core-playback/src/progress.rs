//! # Progress Store
//!
//! Listening progress in the `"playback-info"` collection, keyed by the
//! progress URL. Reads go through `GET /books/{id}/progress`, writes
//! `POST` a [`ProgressUpdate`](crate::models::ProgressUpdate) and fall back
//! to write-behind while offline.

use crate::books::BookUrls;
use crate::error::Result;
use crate::models::{PlaybackPosition, ProgressRecord, ProgressUpdate};
use async_trait::async_trait;
use bridge_traits::{CollectionStore, HttpClient};
use core_cache::{
    CacheConfig, CacheError, Connectivity, EntryWriter, HttpJsonLoader, HttpJsonWriter,
    OfflineCache, ReconcileReport, WriteOutcome,
};
use core_runtime::events::EventBus;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub const PROGRESS_COLLECTION: &str = "playback-info";

/// Where the engine sends periodic position snapshots.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Persist `position`. Must not fail loudly: failures are logged and
    /// retried by the sink's own mechanism.
    async fn save_progress(&self, position: &PlaybackPosition) -> WriteOutcome;
}

/// Posts the update body derived from a cached record.
struct ProgressWriter {
    http: HttpJsonWriter<ProgressUpdate>,
}

#[async_trait]
impl EntryWriter<ProgressRecord> for ProgressWriter {
    async fn write(&self, key: &str, value: &ProgressRecord) -> core_cache::Result<()> {
        self.http.write(key, &value.to_update()).await
    }
}

pub struct ProgressStore {
    cache: OfflineCache<ProgressRecord>,
    urls: BookUrls,
}

impl ProgressStore {
    pub fn builder(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        urls: BookUrls,
    ) -> ProgressStoreBuilder {
        ProgressStoreBuilder {
            http,
            store,
            connectivity,
            urls,
            config: CacheConfig::default(),
            event_bus: None,
            background_reconcile: true,
        }
    }

    /// Last known progress of `book_id`.
    #[instrument(skip(self))]
    pub async fn load(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        let url = self.urls.progress(book_id)?;
        Ok(self.cache.get(url.as_str()).await.map(|mut record| {
            if record.book_id.is_empty() {
                record.book_id = book_id.to_string();
            }
            record
        }))
    }

    /// Merge `position` into the stored record and write it through.
    #[instrument(skip(self, position), fields(book_id = %position.book_id))]
    pub async fn save(&self, position: &PlaybackPosition) -> Result<WriteOutcome> {
        let url = self.urls.progress(&position.book_id)?;
        let mut record = self
            .cache
            .get_local(url.as_str())
            .await
            .map(|stamped| stamped.value)
            .unwrap_or_else(|| ProgressRecord::new(position.book_id.clone()));
        record.apply(position);

        let outcome = self.cache.set(url.as_str(), &record).await;
        debug!(?outcome, section_id = ?position.section_id, "Progress saved");
        Ok(outcome)
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.cache.pending_count().await?)
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.cache.reconcile().await
    }
}

#[async_trait]
impl ProgressSink for ProgressStore {
    async fn save_progress(&self, position: &PlaybackPosition) -> WriteOutcome {
        match self.save(position).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(book_id = %position.book_id, error = %e, "Failed to save progress");
                WriteOutcome::NotPersisted
            }
        }
    }
}

pub struct ProgressStoreBuilder {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn CollectionStore>,
    connectivity: Connectivity,
    urls: BookUrls,
    config: CacheConfig,
    event_bus: Option<EventBus>,
    background_reconcile: bool,
}

impl ProgressStoreBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn background_reconcile(mut self, enabled: bool) -> Self {
        self.background_reconcile = enabled;
        self
    }

    pub fn build(self) -> std::result::Result<ProgressStore, CacheError> {
        let writer = ProgressWriter {
            http: HttpJsonWriter::new(self.http.clone()),
        };
        let mut builder = OfflineCache::builder(self.store, self.connectivity, PROGRESS_COLLECTION)
            .loader(Arc::new(HttpJsonLoader::new(self.http)))
            .writer(Arc::new(writer))
            .config(self.config)
            .background_reconcile(self.background_reconcile);
        if let Some(bus) = self.event_bus {
            builder = builder.event_bus(bus);
        }
        Ok(ProgressStore {
            cache: builder.build()?,
            urls: self.urls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{error::Result as BridgeResult, HttpMethod, HttpRequest, HttpResponse};
    use core_cache::MemoryCollectionStore;
    use mockall::mock;
    use url::Url;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn position(seconds: f64) -> PlaybackPosition {
        PlaybackPosition {
            book_id: "b1".to_string(),
            section_id: Some(2),
            section_progress_seconds: seconds - 10.0,
            global_progress_seconds: seconds,
            playback_rate: 1.25,
        }
    }

    fn urls() -> BookUrls {
        BookUrls::new(Url::parse("https://api/").unwrap())
    }

    #[core_async::test]
    async fn test_save_posts_update_body() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.method == HttpMethod::Post
                    && request.url == "https://api/books/b1/progress"
                    && body["section_id"] == 2
                    && body["section_progress_seconds"] == 2.0
                    && body["playback_rate"] == 1.25
                    && body["sync_current_section"] == true
            })
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, Vec::new())));

        let store = ProgressStore::builder(
            Arc::new(http),
            Arc::new(MemoryCollectionStore::new()),
            Connectivity::online(),
            urls(),
        )
        .background_reconcile(false)
        .build()
        .unwrap();

        assert_eq!(
            store.save_progress(&position(12.0)).await,
            WriteOutcome::Synced
        );
        assert_eq!(store.pending_count().await.unwrap(), 0);
    }

    #[core_async::test]
    async fn test_offline_save_is_queued_and_readable() {
        let http = MockHttpClient::new();
        let store = ProgressStore::builder(
            Arc::new(http),
            Arc::new(MemoryCollectionStore::new()),
            Connectivity::offline(),
            urls(),
        )
        .background_reconcile(false)
        .build()
        .unwrap();

        assert_eq!(store.save(&position(30.0)).await.unwrap(), WriteOutcome::Queued);
        let record = store.load("b1").await.unwrap().unwrap();
        assert_eq!(record.global_progress_seconds, 30.0);
        assert_eq!(record.playback_rate, Some(1.25));
        assert_eq!(store.pending_count().await.unwrap(), 1);
    }

    #[core_async::test]
    async fn test_load_fills_book_id_from_backend_payload() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| request.method == HttpMethod::Get)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"section_id":3,"section_progress_seconds":1.5,"global_progress_seconds":40.0,
                        "total_narrated_seconds":90.0,"available_percent":50.0,
                        "queued_percent":25.0,"unavailable_percent":25.0}"#,
                ))
            });

        let store = ProgressStore::builder(
            Arc::new(http),
            Arc::new(MemoryCollectionStore::new()),
            Connectivity::online(),
            urls(),
        )
        .background_reconcile(false)
        .build()
        .unwrap();

        let record = store.load("b1").await.unwrap().unwrap();
        assert_eq!(record.book_id, "b1");
        assert_eq!(record.section_id, Some(3));
        assert_eq!(record.available_percent, 50.0);
    }
}
