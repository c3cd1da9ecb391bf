//! # Offline-Aware Read/Write Cache
//!
//! Read-through / write-behind cache over a [`PersistentCache`] collection.
//!
//! ## Overview
//!
//! ```text
//!             online                         offline
//!  get ──> loader ──ok──> store (synced)     store ──> value
//!             └──err──> store ──> value
//!
//!  set ──> writer ──ok──> store (synced)     store (pending)
//!             └──err──> store (pending)
//!
//!  offline ──> online ──> replay every pending entry in parallel
//! ```
//!
//! Failures never escape `get`/`set`: they degrade to the local path and
//! are logged. The pending flag is bookkeeping only; callers see values.
//!
//! A cache without a writer never marks entries pending, and a cache
//! without a loader serves reads from local storage only. The loader
//! caches used by the streaming client are built that way.
//!
//! ## Reconciliation
//!
//! When a writer is configured, a background task watches the
//! [`Connectivity`] signal. It starts from "offline", so a cache built while
//! already online replays leftovers from the previous session right away.
//! Passes run inline in that task and therefore never overlap. Each entry is
//! an independent unit: one failure does not affect the others. Every
//! failed replay increments the entry's attempt counter; at
//! `max_sync_attempts` the entry is dead-lettered (kept, no longer pending)
//! and a [`CacheEvent::SyncAbandoned`] is emitted.

use crate::config::CacheConfig;
use crate::connectivity::Connectivity;
use crate::error::{CacheError, Result};
use crate::persistent::{CachedValue, PersistentCache};
use crate::remote::{EntryLoader, EntryWriter};
use bridge_traits::{Clock, CollectionStore};
use chrono::{DateTime, Utc};
use core_async::sync::{watch, CancellationToken, DropGuard};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// What happened to a `set`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The writer acknowledged the value and the local copy is marked synced.
    Synced,
    /// Stored locally, waiting for connectivity (or for a retry after a
    /// failed remote write).
    Queued,
    /// Stored locally; this cache has no writer.
    Stored,
    /// The local write failed and the remote did not confirm either.
    NotPersisted,
}

/// A locally cached value and when it was written.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub value: T,
    pub updated_at: DateTime<Utc>,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub synced: usize,
    pub still_pending: usize,
    pub abandoned: usize,
    /// Entries rewritten locally while their replay was in flight; the newer
    /// write keeps its own flags.
    pub superseded: usize,
}

enum Replay {
    Synced,
    Pending,
    Abandoned,
    Superseded,
}

struct Inner<T> {
    local: PersistentCache<T>,
    connectivity: Connectivity,
    loader: Option<Arc<dyn EntryLoader<T>>>,
    writer: Option<Arc<dyn EntryWriter<T>>>,
    config: CacheConfig,
    event_bus: Option<EventBus>,
}

pub struct OfflineCache<T> {
    inner: Arc<Inner<T>>,
    _reconciler: Option<DropGuard>,
}

impl<T> std::fmt::Debug for OfflineCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineCache")
            .field("collection", &self.inner.local.collection())
            .field("has_loader", &self.inner.loader.is_some())
            .field("has_writer", &self.inner.writer.is_some())
            .finish()
    }
}

impl<T> OfflineCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn builder(
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        collection: impl Into<String>,
    ) -> OfflineCacheBuilder<T> {
        OfflineCacheBuilder {
            store,
            connectivity,
            collection: collection.into(),
            loader: None,
            writer: None,
            clock: None,
            config: CacheConfig::default(),
            event_bus: None,
            background_reconcile: true,
        }
    }

    pub fn collection(&self) -> &str {
        self.inner.local.collection()
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    /// Read `key`, preferring the remote loader while online.
    ///
    /// A locally pending write wins over the loader: the backend has not seen
    /// it yet, so its copy is older.
    #[instrument(skip(self), fields(collection = %self.collection()))]
    pub async fn get(&self, key: &str) -> Option<T> {
        self.inner.get(key).await
    }

    /// Write `key`, pushing it to the writer while online.
    #[instrument(skip(self, value), fields(collection = %self.collection()))]
    pub async fn set(&self, key: &str, value: &T) -> WriteOutcome {
        self.inner.set(key, value).await
    }

    /// Local existence check
    pub async fn has(&self, key: &str) -> Result<bool> {
        self.inner.local.contains(key).await
    }

    /// Every locally stored value, ordered by key
    pub async fn get_all(&self) -> Result<Vec<T>> {
        Ok(self
            .inner
            .local
            .list()
            .await?
            .into_iter()
            .map(|cached| cached.value)
            .collect())
    }

    /// Local read that never touches the network, with the write time.
    pub async fn get_local(&self, key: &str) -> Option<Stamped<T>> {
        match self.inner.local.get(key).await {
            Ok(cached) => cached.map(|cached| Stamped {
                value: cached.value,
                updated_at: cached.updated_at,
            }),
            Err(e) => {
                warn!(key, error = %e, "Local cache read failed");
                None
            }
        }
    }

    /// Whether `entry` is older than `max_age` by this cache's clock.
    pub fn is_stale(&self, entry: &Stamped<T>, max_age: Duration) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => {
                self.inner.local.now().signed_duration_since(entry.updated_at) > max_age
            }
            Err(_) => false,
        }
    }

    /// Remove the local entry, including a pending write.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.inner.local.delete(key).await
    }

    /// Entries still waiting for the backend
    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.inner.local.pending().await?.len())
    }

    /// Replay pending writes now. The background task calls the same pass
    /// on every offline-to-online transition.
    pub async fn reconcile(&self) -> ReconcileReport {
        self.inner.reconcile().await
    }
}

impl<T> Inner<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Cache(event));
        }
    }

    async fn get(&self, key: &str) -> Option<T> {
        let local = match self.local.get(key).await {
            Ok(local) => local,
            Err(e) => {
                warn!(key, error = %e, "Local cache read failed");
                None
            }
        };

        let loader = match &self.loader {
            Some(loader) if self.connectivity.is_online() => loader,
            _ => return local.map(|cached| cached.value),
        };

        if local.as_ref().is_some_and(|cached| cached.sync_when_online) {
            debug!(key, "Pending local write shadows remote value");
            return local.map(|cached| cached.value);
        }

        match loader.load(key).await {
            Ok(value) => {
                if let Err(e) = self.local.put(key, &value, false).await {
                    warn!(key, error = %e, "Failed to cache loaded value");
                }
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Loader failed, falling back to cache");
                local.map(|cached| cached.value)
            }
        }
    }

    async fn set(&self, key: &str, value: &T) -> WriteOutcome {
        let Some(writer) = &self.writer else {
            return match self.local.put(key, value, false).await {
                Ok(()) => WriteOutcome::Stored,
                Err(e) => {
                    warn!(key, error = %e, "Local cache write failed");
                    WriteOutcome::NotPersisted
                }
            };
        };

        if self.connectivity.is_online() {
            match writer.write(key, value).await {
                Ok(()) => {
                    if let Err(e) = self.local.put(key, value, false).await {
                        warn!(key, error = %e, "Remote write succeeded but local copy failed");
                    }
                    return WriteOutcome::Synced;
                }
                Err(e) => {
                    warn!(key, error = %e, "Sync has failed, marking for background sync");
                }
            }
        }

        match self.local.put(key, value, true).await {
            Ok(()) => {
                self.emit(CacheEvent::EntryQueued {
                    collection: self.local.collection().to_string(),
                    key: key.to_string(),
                });
                WriteOutcome::Queued
            }
            Err(e) => {
                warn!(key, error = %e, "Local cache write failed");
                WriteOutcome::NotPersisted
            }
        }
    }

    async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let Some(writer) = &self.writer else {
            return report;
        };

        let pending = match self.local.pending().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(collection = self.local.collection(), error = %e, "Failed to list pending entries");
                return report;
            }
        };
        if pending.is_empty() {
            return report;
        }

        info!(
            collection = self.local.collection(),
            count = pending.len(),
            "Replaying pending writes"
        );

        let outcomes = join_all(
            pending
                .iter()
                .map(|cached| self.replay(writer.as_ref(), cached)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                Ok(Replay::Synced) => report.synced += 1,
                Ok(Replay::Pending) => report.still_pending += 1,
                Ok(Replay::Abandoned) => report.abandoned += 1,
                Ok(Replay::Superseded) => report.superseded += 1,
                Err(e) => {
                    warn!(collection = self.local.collection(), error = %e, "Failed to sync entry");
                    report.still_pending += 1;
                }
            }
        }

        self.emit(CacheEvent::Reconciled {
            collection: self.local.collection().to_string(),
            synced: report.synced,
            still_pending: report.still_pending,
        });
        report
    }

    async fn replay(
        &self,
        writer: &dyn EntryWriter<T>,
        cached: &CachedValue<T>,
    ) -> Result<Replay> {
        if !self.connectivity.is_online() {
            return Ok(Replay::Pending);
        }

        let error = match writer.write(&cached.key, &cached.value).await {
            Ok(()) => {
                return Ok(if self.local.mark_synced(cached).await? {
                    Replay::Synced
                } else {
                    Replay::Superseded
                });
            }
            Err(error) => error,
        };

        let attempts = cached.sync_attempts.saturating_add(1);
        if attempts < self.config.max_sync_attempts {
            debug!(key = %cached.key, attempts, error = %error, "Replay failed");
            return Ok(if self.local.record_attempts(cached, attempts).await? {
                Replay::Pending
            } else {
                Replay::Superseded
            });
        }

        if !self.local.abandon_sync(cached, attempts).await? {
            return Ok(Replay::Superseded);
        }
        warn!(
            collection = self.local.collection(),
            key = %cached.key,
            attempts,
            error = %error,
            "Giving up on pending write"
        );
        self.emit(CacheEvent::SyncAbandoned {
            collection: self.local.collection().to_string(),
            key: cached.key.clone(),
            attempts,
        });
        Ok(Replay::Abandoned)
    }
}

async fn run_reconciler<T>(
    inner: Weak<Inner<T>>,
    mut online: watch::Receiver<bool>,
    shutdown: CancellationToken,
) where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    let mut was_online = false;
    loop {
        let is_online = *online.borrow_and_update();
        if is_online && !was_online {
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.reconcile().await;
            drop(inner);
            // A flap during the pass is a fresh transition
            if online.has_changed().unwrap_or(false) {
                was_online = false;
                continue;
            }
        }
        was_online = is_online;

        core_async::select! {
            _ = shutdown.cancelled() => break,
            changed = online.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!("Reconciler stopped");
}

/// Builder for [`OfflineCache`]
pub struct OfflineCacheBuilder<T> {
    store: Arc<dyn CollectionStore>,
    connectivity: Connectivity,
    collection: String,
    loader: Option<Arc<dyn EntryLoader<T>>>,
    writer: Option<Arc<dyn EntryWriter<T>>>,
    clock: Option<Arc<dyn Clock>>,
    config: CacheConfig,
    event_bus: Option<EventBus>,
    background_reconcile: bool,
}

impl<T> OfflineCacheBuilder<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn loader(mut self, loader: Arc<dyn EntryLoader<T>>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn EntryWriter<T>>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Disable the connectivity watcher; pending writes are then only
    /// replayed through [`OfflineCache::reconcile`].
    pub fn background_reconcile(mut self, enabled: bool) -> Self {
        self.background_reconcile = enabled;
        self
    }

    /// Build the cache. With a writer and background reconciliation enabled
    /// this spawns the watcher, so it must run inside a runtime.
    pub fn build(self) -> Result<OfflineCache<T>> {
        self.config.validate().map_err(CacheError::Config)?;

        let mut local = PersistentCache::new(self.store, self.collection);
        if let Some(clock) = self.clock {
            local = local.with_clock(clock);
        }

        let inner = Arc::new(Inner {
            local,
            connectivity: self.connectivity,
            loader: self.loader,
            writer: self.writer,
            config: self.config,
            event_bus: self.event_bus,
        });

        let reconciler = if inner.writer.is_some() && self.background_reconcile {
            let shutdown = CancellationToken::new();
            core_async::spawn(run_reconciler(
                Arc::downgrade(&inner),
                inner.connectivity.subscribe(),
                shutdown.clone(),
            ));
            Some(shutdown.drop_guard())
        } else {
            None
        };

        Ok(OfflineCache {
            inner,
            _reconciler: reconciler,
        })
    }
}
