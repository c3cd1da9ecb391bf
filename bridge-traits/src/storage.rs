//! Local Collection Storage
//!
//! Named collections of keyed entries, the durable substrate under every
//! cache in the core (`books`, `files`, `fragments`, `playlists`,
//! `playback-info`, `download-info`).
//!
//! Each entry carries the serialized payload plus the bookkeeping the
//! offline cache needs: whether it still has to be pushed to the backend
//! and how many times that push has failed.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::Result;

/// One row of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub key: String,
    /// Serialized value (JSON for every cache in the core)
    pub payload: Bytes,
    /// `true` while a local write has not been confirmed by the backend
    pub sync_when_online: bool,
    /// Failed remote writes since the entry was last marked pending
    pub sync_attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(key: impl Into<String>, payload: impl Into<Bytes>, updated_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
            sync_when_online: false,
            sync_attempts: 0,
            updated_at,
        }
    }

    pub fn pending(mut self) -> Self {
        self.sync_when_online = true;
        self
    }
}

/// Durable keyed storage partitioned into collections.
///
/// Every method is its own transaction: implementations must not leave a
/// half-applied write behind if the caller's future is dropped after the
/// call returns. Concurrent `put`s on the same key are last-writer-wins.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{CollectionStore, StoredEntry};
///
/// async fn remember(store: &dyn CollectionStore, now: DateTime<Utc>) -> Result<()> {
///     store.put("books", StoredEntry::new("42", br#"{"id":42}"#.to_vec(), now)).await
/// }
/// ```
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Fetch one entry
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredEntry>>;

    /// Insert or replace an entry
    async fn put(&self, collection: &str, entry: StoredEntry) -> Result<()>;

    /// Remove an entry, returning whether it existed
    async fn delete(&self, collection: &str, key: &str) -> Result<bool>;

    /// Check if an entry exists
    async fn contains(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self.get(collection, key).await?.is_some())
    }

    /// Rewrite the sync bookkeeping of an entry, but only while its payload
    /// still equals `expected_payload`.
    ///
    /// Returns `false` when the entry vanished or was overwritten since the
    /// caller read it; a newer local write must keep its own flags.
    async fn update_sync_state(
        &self,
        collection: &str,
        key: &str,
        expected_payload: &[u8],
        sync_when_online: bool,
        sync_attempts: u32,
    ) -> Result<bool>;

    /// All entries of a collection, ordered by key
    async fn list(&self, collection: &str) -> Result<Vec<StoredEntry>>;

    /// Entries still waiting to be pushed to the backend
    async fn list_pending(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .filter(|entry| entry.sync_when_online)
            .collect())
    }

    /// Remove every entry of a collection
    async fn clear(&self, collection: &str) -> Result<()>;
}
