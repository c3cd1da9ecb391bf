//! Cache-first loader.

use super::{Loader, LoaderContext, LoaderResponse, ResourceKind};
use crate::error::LoadError;
use async_trait::async_trait;
use bridge_traits::CollectionStore;
use core_cache::{CacheConfig, CacheError, Connectivity, OfflineCache, WriteOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Serves a load from the cache when the URL is present, otherwise
/// delegates to `inner` and caches its response before returning it.
///
/// With a `max_age`, entries older than that are revalidated while online;
/// a failed revalidation still serves the old entry.
pub struct CachingLoader {
    inner: Arc<dyn Loader>,
    cache: OfflineCache<LoaderResponse>,
    max_age: Option<Duration>,
}

impl CachingLoader {
    pub fn new(inner: Arc<dyn Loader>, cache: OfflineCache<LoaderResponse>) -> Self {
        Self {
            inner,
            cache,
            max_age: None,
        }
    }

    /// Build over the collection `kind` maps to, with the freshness window
    /// `config` assigns to it.
    pub fn for_kind(
        inner: Arc<dyn Loader>,
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        kind: ResourceKind,
        config: &CacheConfig,
    ) -> Result<Self, CacheError> {
        let cache = OfflineCache::builder(store, connectivity, kind.collection())
            .config(config.clone())
            .build()?;
        let max_age = match kind {
            ResourceKind::Manifest => config.manifest_max_age,
            ResourceKind::Fragment | ResourceKind::File => config.fragment_max_age,
        };
        Ok(Self::new(inner, cache).with_max_age(max_age))
    }

    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn collection(&self) -> &str {
        self.cache.collection()
    }

    pub async fn is_cached(&self, url: &str) -> bool {
        match self.cache.has(url).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(url, error = %e, "Cache lookup failed");
                false
            }
        }
    }

    pub async fn evict(&self, url: &str) -> Result<bool, CacheError> {
        self.cache.delete(url).await
    }

    async fn store(&self, response: &LoaderResponse) {
        if self.cache.set(&response.url, response).await == WriteOutcome::NotPersisted {
            warn!(url = %response.url, "Loaded response could not be cached");
        }
    }

    async fn fetch(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
        let mut response = self.inner.load(context).await?;
        // Cache under the requested URL even if the loader reports another
        response.url = context.url.clone();
        self.store(&response).await;
        Ok(response)
    }
}

#[async_trait]
impl Loader for CachingLoader {
    #[instrument(skip(self, context), fields(url = %context.url, collection = self.collection()))]
    async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
        let Some(hit) = self.cache.get_local(&context.url).await else {
            return self.fetch(context).await;
        };

        let stale = self
            .max_age
            .is_some_and(|max_age| self.cache.is_stale(&hit, max_age));
        if !stale || !self.cache.is_online() {
            debug!("Cache hit");
            return Ok(hit.value);
        }

        match self.fetch(context).await {
            Ok(response) => Ok(response),
            Err(e @ LoadError::Aborted { .. }) => Err(e),
            Err(e) => {
                warn!(error = %e, "Revalidation failed, serving cached copy");
                Ok(hit.value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::ManualClock;
    use core_cache::MemoryCollectionStore;
    use parking_lot::Mutex;

    struct ScriptedLoader {
        responses: Mutex<Vec<Result<LoaderResponse, LoadError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedLoader {
        fn new(responses: Vec<Result<LoaderResponse, LoadError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock()
        }
    }

    #[async_trait]
    impl Loader for ScriptedLoader {
        async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
            *self.calls.lock() += 1;
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                return Err(LoadError::Network {
                    url: context.url.clone(),
                    message: "unscripted".to_string(),
                });
            }
            responses.remove(0)
        }
    }

    fn body(text: &str) -> Result<LoaderResponse, LoadError> {
        Ok(LoaderResponse::new("u", text.as_bytes().to_vec()))
    }

    fn cache(connectivity: Connectivity, clock: Arc<ManualClock>) -> OfflineCache<LoaderResponse> {
        OfflineCache::builder(
            Arc::new(MemoryCollectionStore::new()),
            connectivity,
            "playlists",
        )
        .clock(clock)
        .build()
        .unwrap()
    }

    #[core_async::test]
    async fn test_miss_loads_and_caches_then_hit_skips_network() {
        let inner = Arc::new(ScriptedLoader::new(vec![body("v1")]));
        let loader = CachingLoader::new(
            inner.clone(),
            cache(Connectivity::online(), Arc::new(ManualClock::default())),
        );
        let context = LoaderContext::manifest("https://api/books/b1/m3u8");

        let first = loader.load(&context).await.unwrap();
        let second = loader.load(&context).await.unwrap();

        assert_eq!(first.data, second.data);
        assert_eq!(second.url, "https://api/books/b1/m3u8");
        assert_eq!(inner.calls(), 1);
        assert!(loader.is_cached("https://api/books/b1/m3u8").await);
    }

    #[core_async::test]
    async fn test_errors_pass_through_on_miss() {
        let inner = Arc::new(ScriptedLoader::new(vec![Err(LoadError::Http {
            url: "u".to_string(),
            status: 404,
        })]));
        let loader = CachingLoader::new(
            inner,
            cache(Connectivity::online(), Arc::new(ManualClock::default())),
        );

        let err = loader
            .load(&LoaderContext::manifest("https://api/x"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));
        assert!(!loader.is_cached("https://api/x").await);
    }

    #[core_async::test]
    async fn test_stale_entry_is_revalidated_online() {
        let clock = Arc::new(ManualClock::default());
        let inner = Arc::new(ScriptedLoader::new(vec![body("v1"), body("v2")]));
        let loader = CachingLoader::new(inner.clone(), cache(Connectivity::online(), clock.clone()))
            .with_max_age(Some(Duration::from_secs(60)));
        let context = LoaderContext::manifest("https://api/books/b1/m3u8");

        loader.load(&context).await.unwrap();
        clock.advance(Duration::from_secs(120));
        let refreshed = loader.load(&context).await.unwrap();

        assert_eq!(refreshed.text().unwrap(), "v2");
        assert_eq!(inner.calls(), 2);
    }

    #[core_async::test]
    async fn test_stale_entry_served_when_revalidation_fails() {
        let clock = Arc::new(ManualClock::default());
        let inner = Arc::new(ScriptedLoader::new(vec![body("v1")]));
        let loader = CachingLoader::new(inner.clone(), cache(Connectivity::online(), clock.clone()))
            .with_max_age(Some(Duration::from_secs(60)));
        let context = LoaderContext::manifest("https://api/books/b1/m3u8");

        loader.load(&context).await.unwrap();
        clock.advance(Duration::from_secs(120));
        let served = loader.load(&context).await.unwrap();

        assert_eq!(served.text().unwrap(), "v1");
        assert_eq!(inner.calls(), 2);
    }

    #[core_async::test]
    async fn test_stale_entry_served_offline_without_network() {
        let clock = Arc::new(ManualClock::default());
        let connectivity = Connectivity::online();
        let inner = Arc::new(ScriptedLoader::new(vec![body("v1")]));
        let loader = CachingLoader::new(inner.clone(), cache(connectivity.clone(), clock.clone()))
            .with_max_age(Some(Duration::from_secs(60)));
        let context = LoaderContext::manifest("https://api/books/b1/m3u8");

        loader.load(&context).await.unwrap();
        clock.advance(Duration::from_secs(120));
        connectivity.set_online(false);

        assert_eq!(loader.load(&context).await.unwrap().text().unwrap(), "v1");
        assert_eq!(inner.calls(), 1);
    }
}
