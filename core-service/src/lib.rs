//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, collection
//! storage, network monitoring) into the narration core. Every component is
//! constructed here and receives its collaborators explicitly; nothing is
//! looked up from global state. Desktop apps typically enable the
//! `desktop-shims` feature, which lets [`CoreConfig`] fall back to the
//! reqwest client, the SQLite store and the TCP-probe network monitor.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_async::sync::CancellationToken;
use core_async::task::JoinHandle;
use core_cache::{CacheConfig, Connectivity, ReconcileReport};
use core_playback::{
    BookDetails, BookUrls, BooksRepository, CachingLoader, DownloadConfig, DownloadInfo,
    DownloadOrchestrator, FileLoader, FileRetryConfig, HeadlessMediaFactory, HttpLoader, Loader,
    MediaFactory, PlaybackConfig, PlaybackEngine, ProgressRecord, ProgressStore, ResourceKind,
    StreamingClient,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream, DEFAULT_EVENT_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Tunables of the individual components.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub file_retry: FileRetryConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Primary façade exposed to host applications.
pub struct AudiobookService {
    config: CoreConfig,
    connectivity: Connectivity,
    event_bus: EventBus,
    books: Arc<BooksRepository>,
    progress: Arc<ProgressStore>,
    files: Arc<FileLoader>,
    engine: PlaybackEngine,
    downloads: DownloadOrchestrator,
    shutdown: CancellationToken,
    _connectivity_follower: Option<JoinHandle<()>>,
}

impl AudiobookService {
    pub fn builder(config: CoreConfig) -> AudiobookServiceBuilder {
        AudiobookServiceBuilder {
            config,
            settings: ServiceSettings::default(),
            media_factory: None,
            connectivity: None,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// The online/offline signal shared by every cache. Hosts without
    /// network awareness flip it themselves.
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub fn events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Transport and observable playback state.
    pub fn player(&self) -> &PlaybackEngine {
        &self.engine
    }

    pub fn books(&self) -> &BooksRepository {
        &self.books
    }

    pub fn files(&self) -> &FileLoader {
        &self.files
    }

    /// Select `book_id` for playback: fetch its details, attach the stream
    /// and resume from the stored progress when there is any.
    #[instrument(skip(self))]
    pub async fn open_book(&self, book_id: &str) -> Result<BookDetails> {
        let book = self.books.get(book_id).await?;
        self.engine.set_book_details(book.clone()).await?;

        match self.progress.load(book_id).await? {
            Some(record) => {
                self.engine.set_playback_progress(&record).await?;
                info!(
                    global_progress_seconds = record.global_progress_seconds,
                    "Resumed from stored progress"
                );
            }
            None => info!("No stored progress; starting from the beginning"),
        }
        Ok(book)
    }

    pub async fn load_progress(&self, book_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self.progress.load(book_id).await?)
    }

    /// Progress writes still waiting for the backend.
    pub async fn pending_progress_writes(&self) -> Result<usize> {
        Ok(self.progress.pending_count().await?)
    }

    /// Replay queued progress writes now instead of waiting for the next
    /// reconnect.
    pub async fn reconcile_progress(&self) -> ReconcileReport {
        self.progress.reconcile().await
    }

    pub async fn get_download_info(&self, book_id: &str) -> Option<DownloadInfo> {
        self.downloads.get_download_info(book_id).await
    }

    pub async fn download_book(
        &self,
        book_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadInfo> {
        let cancel = cancel.child_token();
        let abort_on_shutdown = self.shutdown.clone();
        let relay = cancel.clone();
        let watcher = core_async::spawn(async move {
            abort_on_shutdown.cancelled().await;
            relay.cancel();
        });
        let result = self.downloads.download_book(book_id, &cancel).await;
        watcher.abort();
        Ok(result?)
    }

    pub async fn delete_book_data(&self, book_id: &str) -> Result<u64> {
        Ok(self.downloads.delete_book_data(book_id).await?)
    }

    /// Stop playback cadences, background loops and running downloads.
    pub async fn shutdown(&self) {
        self.engine.destroy().await;
        self.shutdown.cancel();
        info!("Audiobook service shut down");
    }
}

impl Drop for AudiobookService {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builder for [`AudiobookService`]
pub struct AudiobookServiceBuilder {
    config: CoreConfig,
    settings: ServiceSettings,
    media_factory: Option<Arc<dyn MediaFactory>>,
    connectivity: Option<Connectivity>,
}

impl AudiobookServiceBuilder {
    pub fn settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Audio output for attached books. Defaults to the headless clock.
    pub fn media_factory(mut self, factory: Arc<dyn MediaFactory>) -> Self {
        self.media_factory = Some(factory);
        self
    }

    /// Use a host-driven connectivity signal instead of the configured
    /// network monitor.
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Wire every component. Spawns background tasks, so it must run inside
    /// a runtime.
    pub async fn build(self) -> Result<AudiobookService> {
        let config = self.config;
        let settings = self.settings;
        let shutdown = CancellationToken::new();

        let (connectivity, follower) = match (self.connectivity, &config.network_monitor) {
            (Some(connectivity), _) => (connectivity, None),
            (None, Some(monitor)) if config.features.enable_network_awareness => {
                let (connectivity, handle) =
                    Connectivity::follow(monitor.clone(), shutdown.child_token()).await?;
                (connectivity, Some(handle))
            }
            (None, _) => {
                warn!("No network awareness configured; assuming online");
                (Connectivity::online(), None)
            }
        };

        let store = config.collection_store.clone();
        let http = config.http_client.clone();
        let urls = BookUrls::new(config.api_base_url.clone());
        let event_bus = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let reconcile = config.features.enable_background_reconcile;

        let network: Arc<dyn Loader> = Arc::new(HttpLoader::new(http.clone()));
        let manifests = Arc::new(CachingLoader::for_kind(
            network.clone(),
            store.clone(),
            connectivity.clone(),
            ResourceKind::Manifest,
            &settings.cache,
        )?);
        // Fragments go through the file cache so downloaded books play offline
        let files = Arc::new(FileLoader::new(
            network,
            store.clone(),
            connectivity.clone(),
            &settings.cache,
            &settings.file_retry,
        )?);
        let client = StreamingClient::new(manifests, files.clone());

        let books = Arc::new(BooksRepository::new(
            http.clone(),
            store.clone(),
            connectivity.clone(),
            urls.clone(),
            &settings.cache,
        )?);

        let progress = Arc::new(
            ProgressStore::builder(http, store.clone(), connectivity.clone(), urls.clone())
                .config(settings.cache.clone())
                .event_bus(event_bus.clone())
                .background_reconcile(reconcile)
                .build()?,
        );

        let media_factory = self
            .media_factory
            .unwrap_or_else(|| Arc::new(HeadlessMediaFactory));
        let engine = PlaybackEngine::builder(client.clone(), media_factory, progress.clone(), urls)
            .config(settings.playback)
            .event_bus(event_bus.clone())
            .build()?;

        let downloads = DownloadOrchestrator::new(
            books.clone(),
            client,
            files.clone(),
            store,
            connectivity.clone(),
            settings.download,
        )?
        .with_event_bus(event_bus.clone());

        info!(
            api = %config.api_base_url,
            online = connectivity.is_online(),
            "Audiobook service ready"
        );

        Ok(AudiobookService {
            config,
            connectivity,
            event_bus,
            books,
            progress,
            files,
            engine,
            downloads,
            shutdown,
            _connectivity_follower: follower,
        })
    }
}

/// Convenience bootstrapper for desktop hosts: reqwest, SQLite at the default
/// location and network awareness through the TCP probe.
///
/// ```no_run
/// # #[cfg(feature = "desktop-shims")]
/// # async fn example() -> core_service::Result<()> {
/// let service = core_service::bootstrap_desktop("https://narration.example.com/api").await?;
/// service.open_book("42").await?;
/// service.player().play().await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(api_base_url: &str) -> Result<AudiobookService> {
    let config = CoreConfig::builder()
        .api_base_url(api_base_url)
        .enable_network_awareness(true)
        .build()?;
    AudiobookService::builder(config).build().await
}
