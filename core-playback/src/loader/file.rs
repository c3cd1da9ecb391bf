//! Resilient file loader.
//!
//! Cache-first like [`CachingLoader`], but a miss goes to the network
//! through a retry loop: exponential backoff from `initial_delay`, capped at
//! `max_delay`, with ±`jitter` applied to every delay. Once the budget is
//! spent the caller gets [`LoadError::GatewayTimeout`]. Non-retryable
//! failures (4xx, aborts, bad bodies) are returned immediately.

use super::{CachingLoader, Loader, LoaderContext, LoaderResponse, ResourceKind};
use crate::config::FileRetryConfig;
use crate::error::LoadError;
use async_trait::async_trait;
use bridge_traits::{CollectionStore, RetryPolicy};
use core_cache::{CacheConfig, CacheError, Connectivity};
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

struct RetryingLoader {
    inner: Arc<dyn Loader>,
    policy: RetryPolicy,
}

fn jitter_sample() -> f64 {
    rand::thread_rng().gen_range(-1.0..=1.0)
}

#[async_trait]
impl Loader for RetryingLoader {
    async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.inner.load(context).await {
                Ok(response) => return Ok(response),
                Err(error) if !error.is_retryable() => return Err(error),
                Err(error) => error,
            };

            if attempt >= self.policy.max_attempts {
                warn!(url = %context.url, attempts = attempt, error = %error, "Retries exhausted");
                return Err(LoadError::GatewayTimeout {
                    url: context.url.clone(),
                    attempts: attempt,
                });
            }

            let delay = self
                .policy
                .apply_jitter(self.policy.delay_for_attempt(attempt), jitter_sample());
            debug!(url = %context.url, attempt, ?delay, error = %error, "Retrying load");

            core_async::select! {
                biased;
                _ = context.cancel.cancelled() => return Err(context.aborted()),
                _ = core_async::sleep(delay) => {}
            }
        }
    }
}

/// Cache-first loader over the `"files"` collection with retry on miss.
pub struct FileLoader {
    cached: CachingLoader,
}

impl FileLoader {
    pub fn new(
        network: Arc<dyn Loader>,
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        cache_config: &CacheConfig,
        retry: &FileRetryConfig,
    ) -> Result<Self, CacheError> {
        retry.validate().map_err(CacheError::Config)?;
        let retrying = Arc::new(RetryingLoader {
            inner: network,
            policy: retry.retry_policy(),
        });
        let cached = CachingLoader::for_kind(
            retrying,
            store,
            connectivity,
            ResourceKind::File,
            cache_config,
        )?;
        Ok(Self { cached })
    }

    pub async fn is_cached(&self, url: &str) -> bool {
        self.cached.is_cached(url).await
    }

    /// Drop `url` from the cache. Returns whether it was present.
    pub async fn evict(&self, url: &str) -> Result<bool, CacheError> {
        self.cached.evict(url).await
    }
}

#[async_trait]
impl Loader for FileLoader {
    #[instrument(skip(self, context), fields(url = %context.url))]
    async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
        self.cached.load(context).await
    }
}
