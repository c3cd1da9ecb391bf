//! # Download Orchestrator
//!
//! Makes a book playable offline by pulling every fragment of its manifest
//! into the `"files"` cache, and tracks progress in a Download Status Record
//! (`"download-info"` collection, keyed by book id).
//!
//! Fragments already in the cache count as downloaded without a network call.
//! Up to [`DownloadConfig::concurrency`] fetches run at once, and the status
//! record is rewritten at most once per sample interval plus once at the end.

use crate::books::{BookUrls, BooksRepository};
use crate::config::DownloadConfig;
use crate::error::{LoadError, PlaybackError, Result};
use crate::loader::{FileLoader, Loader, LoaderContext};
use crate::models::DownloadInfo;
use crate::streaming::StreamingClient;
use bridge_traits::CollectionStore;
use core_async::sync::CancellationToken;
use core_async::time::{interval_at, Instant, MissedTickBehavior};
use core_cache::{Connectivity, OfflineCache};
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use core_runtime::logging::redact_url;
use futures::{stream, TryStreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const DOWNLOAD_COLLECTION: &str = "download-info";

pub struct DownloadOrchestrator {
    books: Arc<BooksRepository>,
    client: StreamingClient,
    files: Arc<FileLoader>,
    status: OfflineCache<DownloadInfo>,
    urls: BookUrls,
    config: DownloadConfig,
    event_bus: Option<EventBus>,
}

impl DownloadOrchestrator {
    pub fn new(
        books: Arc<BooksRepository>,
        client: StreamingClient,
        files: Arc<FileLoader>,
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        config: DownloadConfig,
    ) -> Result<Self> {
        config.validate().map_err(PlaybackError::Config)?;
        let status = OfflineCache::builder(store, connectivity, DOWNLOAD_COLLECTION).build()?;
        let urls = books.urls().clone();
        Ok(Self {
            books,
            client,
            files,
            status,
            urls,
            config,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Download(event));
        }
    }

    /// Last stored status record of `book_id`.
    pub async fn get_download_info(&self, book_id: &str) -> Option<DownloadInfo> {
        self.status.get(book_id).await
    }

    /// Fetch every fragment of `book_id` into the cache.
    ///
    /// Cancelling `cancel` aborts in-flight fetches; fragments that finished
    /// stay cached and the status record keeps the count reached so far.
    #[instrument(skip(self, cancel))]
    pub async fn download_book(
        &self,
        book_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadInfo> {
        let mut info = DownloadInfo::new(book_id);
        self.status.set(book_id, &info).await;

        let urls = match self.resolve(book_id).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "Could not resolve fragments");
                self.emit(DownloadEvent::Failed {
                    book_id: book_id.to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        info.fragments_total = urls.len() as u64;
        self.status.set(book_id, &info).await;
        info!(fragments = info.fragments_total, "Download started");
        self.emit(DownloadEvent::Started {
            book_id: book_id.to_string(),
            fragments_total: info.fragments_total,
        });

        let downloaded = AtomicU64::new(0);
        let fetch_all = stream::iter(urls.iter().map(Ok::<_, LoadError>))
            .try_for_each_concurrent(self.config.concurrency, |url| {
                let files = &self.files;
                let downloaded = &downloaded;
                async move {
                    if !files.is_cached(url).await {
                        let context = LoaderContext::file(url.as_str()).with_cancel(cancel.clone());
                        files.load(&context).await?;
                    }
                    downloaded.fetch_add(1, Ordering::Relaxed);
                    Ok::<(), LoadError>(())
                }
            });
        let mut fetch_all = std::pin::pin!(fetch_all);

        let period = self.config.progress_sample_interval;
        let mut sampler = interval_at(Instant::now() + period, period);
        sampler.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            core_async::select! {
                biased;
                _ = cancel.cancelled() => break Err(PlaybackError::Cancelled(book_id.to_string())),
                result = &mut fetch_all => break result.map_err(PlaybackError::from),
                _ = sampler.tick() => {
                    let count = downloaded.load(Ordering::Relaxed);
                    if count != info.fragments_downloaded {
                        info.fragments_downloaded = count;
                        self.status.set(book_id, &info).await;
                        self.emit(DownloadEvent::Progress {
                            book_id: book_id.to_string(),
                            fragments_total: info.fragments_total,
                            fragments_downloaded: count,
                        });
                    }
                }
            }
        };

        info.fragments_downloaded = downloaded.load(Ordering::Relaxed);
        self.status.set(book_id, &info).await;

        match outcome {
            Ok(()) => {
                info!(fragments = info.fragments_total, "Download completed");
                self.emit(DownloadEvent::Completed {
                    book_id: book_id.to_string(),
                    fragments_total: info.fragments_total,
                });
                Ok(info)
            }
            Err(PlaybackError::Cancelled(id)) => {
                info!(
                    downloaded = info.fragments_downloaded,
                    "Download cancelled"
                );
                self.emit(DownloadEvent::Cancelled {
                    book_id: book_id.to_string(),
                    fragments_downloaded: info.fragments_downloaded,
                });
                Err(PlaybackError::Cancelled(id))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    downloaded = info.fragments_downloaded,
                    "Download failed"
                );
                self.emit(DownloadEvent::Failed {
                    book_id: book_id.to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Evict every cached fragment of `book_id`, one at a time, then drop
    /// its status record. Returns how many fragments were evicted.
    ///
    /// A fragment that fails to evict is logged and skipped. When the
    /// manifest cannot be resolved nothing is evicted, but the status record
    /// is still dropped.
    #[instrument(skip(self))]
    pub async fn delete_book_data(&self, book_id: &str) -> Result<u64> {
        let urls = match self.fragment_urls(book_id).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "Could not resolve fragments to evict");
                Vec::new()
            }
        };

        let mut evicted = 0;
        for url in &urls {
            match self.files.evict(url).await {
                Ok(true) => evicted += 1,
                Ok(false) => {}
                Err(e) => warn!(url = %redact_url(url), error = %e, "Failed to evict fragment"),
            }
        }

        self.status.delete(book_id).await?;
        info!(evicted, "Downloaded data deleted");
        self.emit(DownloadEvent::Deleted {
            book_id: book_id.to_string(),
            fragments_evicted: evicted,
        });
        Ok(evicted)
    }

    async fn fragment_urls(&self, book_id: &str) -> Result<Vec<String>> {
        let manifest_url = self.urls.manifest(book_id)?;
        self.client.fragment_urls(&manifest_url).await
    }

    async fn resolve(&self, book_id: &str) -> Result<Vec<String>> {
        self.books.get(book_id).await?;
        let urls = self.fragment_urls(book_id).await?;
        debug!(fragments = urls.len(), "Fragments resolved");
        Ok(urls)
    }
}
