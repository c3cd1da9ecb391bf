//! # Persistent Cache
//!
//! Typed view over one collection of a [`CollectionStore`]. Values are
//! stored as JSON alongside the sync bookkeeping the offline cache needs.
//!
//! Every method maps to a single store call, so concurrent instances over
//! the same collection need no coordination beyond the store's own
//! per-call atomicity.

use crate::error::{CacheError, Result};
use bridge_traits::{Clock, CollectionStore, StoredEntry, SystemClock};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;

/// A decoded entry together with its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub key: String,
    pub value: T,
    pub sync_when_online: bool,
    pub sync_attempts: u32,
    pub updated_at: DateTime<Utc>,
    /// Encoded form as stored; used to detect concurrent rewrites.
    pub(crate) payload: Bytes,
}

pub struct PersistentCache<T> {
    store: Arc<dyn CollectionStore>,
    collection: String,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PersistentCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            clock: Arc::clone(&self.clock),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for PersistentCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCache")
            .field("collection", &self.collection)
            .finish()
    }
}

impl<T> PersistentCache<T> {
    pub fn new(store: Arc<dyn CollectionStore>, collection: impl Into<String>) -> Self {
        Self {
            store,
            collection: collection.into(),
            clock: Arc::new(SystemClock),
            _marker: PhantomData,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl<T> PersistentCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, key: &str, value: &T) -> Result<Bytes> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|source| CacheError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    fn decode(&self, entry: StoredEntry) -> Result<CachedValue<T>> {
        let value = serde_json::from_slice(&entry.payload).map_err(|source| {
            CacheError::Serialization {
                key: entry.key.clone(),
                source,
            }
        })?;
        Ok(CachedValue {
            key: entry.key,
            value,
            sync_when_online: entry.sync_when_online,
            sync_attempts: entry.sync_attempts,
            updated_at: entry.updated_at,
            payload: entry.payload,
        })
    }

    pub async fn get(&self, key: &str) -> Result<Option<CachedValue<T>>> {
        match self.store.get(&self.collection, key).await? {
            Some(entry) => self.decode(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Write `value`, resetting the attempt counter.
    pub async fn put(&self, key: &str, value: &T, sync_when_online: bool) -> Result<()> {
        let payload = self.encode(key, value)?;
        let entry = StoredEntry {
            key: key.to_string(),
            payload,
            sync_when_online,
            sync_attempts: 0,
            updated_at: self.clock.now(),
        };
        self.store.put(&self.collection, entry).await?;
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.store.contains(&self.collection, key).await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.store.delete(&self.collection, key).await?)
    }

    pub async fn list(&self) -> Result<Vec<CachedValue<T>>> {
        self.store
            .list(&self.collection)
            .await?
            .into_iter()
            .map(|entry| self.decode(entry))
            .collect()
    }

    pub async fn pending(&self) -> Result<Vec<CachedValue<T>>> {
        self.store
            .list_pending(&self.collection)
            .await?
            .into_iter()
            .map(|entry| self.decode(entry))
            .collect()
    }

    /// Clear the pending flag of `cached` unless the key was rewritten since
    /// it was read. Returns whether the flag was cleared.
    pub async fn mark_synced(&self, cached: &CachedValue<T>) -> Result<bool> {
        Ok(self
            .store
            .update_sync_state(&self.collection, &cached.key, &cached.payload, false, 0)
            .await?)
    }

    /// Keep `cached` pending with a new attempt count, under the same
    /// rewrite check as [`mark_synced`](Self::mark_synced).
    pub async fn record_attempts(&self, cached: &CachedValue<T>, attempts: u32) -> Result<bool> {
        Ok(self
            .store
            .update_sync_state(&self.collection, &cached.key, &cached.payload, true, attempts)
            .await?)
    }

    /// Stop replaying `cached`; the value stays readable.
    pub async fn abandon_sync(&self, cached: &CachedValue<T>, attempts: u32) -> Result<bool> {
        Ok(self
            .store
            .update_sync_state(&self.collection, &cached.key, &cached.payload, false, attempts)
            .await?)
    }

    pub async fn clear(&self) -> Result<()> {
        Ok(self.store.clear(&self.collection).await?)
    }
}
