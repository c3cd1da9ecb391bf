//! In-memory [`CollectionStore`]
//!
//! Used by tests and by hosts that run without durable storage.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    storage::{CollectionStore, StoredEntry},
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct MemoryCollectionStore {
    collections: RwLock<HashMap<String, BTreeMap<String, StoredEntry>>>,
}

impl MemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a collection
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl CollectionStore for MemoryCollectionStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<StoredEntry>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn put(&self, collection: &str, entry: StoredEntry) -> Result<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        Ok(self
            .collections
            .write()
            .get_mut(collection)
            .is_some_and(|entries| entries.remove(key).is_some()))
    }

    async fn update_sync_state(
        &self,
        collection: &str,
        key: &str,
        expected_payload: &[u8],
        sync_when_online: bool,
        sync_attempts: u32,
    ) -> Result<bool> {
        let mut collections = self.collections.write();
        let Some(entry) = collections
            .get_mut(collection)
            .and_then(|entries| entries.get_mut(key))
        else {
            return Ok(false);
        };
        if entry.payload.as_ref() != expected_payload {
            return Ok(false);
        }
        entry.sync_when_online = sync_when_online;
        entry.sync_attempts = sync_attempts;
        Ok(true)
    }

    async fn list(&self, collection: &str) -> Result<Vec<StoredEntry>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.collections.write().remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[core_async::test]
    async fn test_list_is_ordered_by_key() {
        let store = MemoryCollectionStore::new();
        for key in ["b", "c", "a"] {
            store
                .put("files", StoredEntry::new(key, key.as_bytes().to_vec(), Utc::now()))
                .await
                .unwrap();
        }

        let keys: Vec<_> = store
            .list("files")
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(store.len("files"), 3);
        assert_eq!(store.len("fragments"), 0);
    }

    #[core_async::test]
    async fn test_update_sync_state_checks_payload() {
        let store = MemoryCollectionStore::new();
        store
            .put("books", StoredEntry::new("1", b"v2".to_vec(), Utc::now()).pending())
            .await
            .unwrap();

        assert!(!store.update_sync_state("books", "1", b"v1", false, 0).await.unwrap());
        assert!(store.update_sync_state("books", "1", b"v2", false, 0).await.unwrap());
        assert!(store.list_pending("books").await.unwrap().is_empty());
    }
}
