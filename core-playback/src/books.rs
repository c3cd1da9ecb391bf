//! # Books Repository
//!
//! Backend URL layout and the read-through cache of book metadata.

use crate::error::{PlaybackError, Result};
use crate::models::BookDetails;
use bridge_traits::{CollectionStore, HttpClient};
use core_cache::{CacheConfig, CacheError, Connectivity, HttpJsonLoader, OfflineCache};
use std::sync::Arc;
use tracing::instrument;
use url::Url;

pub const BOOKS_COLLECTION: &str = "books";

/// Builds the book endpoints below the API base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct BookUrls {
    base: Url,
}

impl BookUrls {
    pub fn new(mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `{base}/books/{id}`
    pub fn book(&self, book_id: &str) -> Result<Url> {
        Ok(self.base.join(&format!("books/{book_id}"))?)
    }

    /// `{base}/books/{id}/m3u8`
    pub fn manifest(&self, book_id: &str) -> Result<Url> {
        Ok(self.base.join(&format!("books/{book_id}/m3u8"))?)
    }

    /// `{base}/books/{id}/progress`
    pub fn progress(&self, book_id: &str) -> Result<Url> {
        Ok(self.base.join(&format!("books/{book_id}/progress"))?)
    }
}

/// `GET /books/{id}`, cached in the `"books"` collection.
pub struct BooksRepository {
    cache: OfflineCache<BookDetails>,
    urls: BookUrls,
}

impl BooksRepository {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: Arc<dyn CollectionStore>,
        connectivity: Connectivity,
        urls: BookUrls,
        config: &CacheConfig,
    ) -> std::result::Result<Self, CacheError> {
        let cache = OfflineCache::builder(store, connectivity, BOOKS_COLLECTION)
            .loader(Arc::new(HttpJsonLoader::new(http)))
            .config(config.clone())
            .build()?;
        Ok(Self { cache, urls })
    }

    pub fn urls(&self) -> &BookUrls {
        &self.urls
    }

    /// Book metadata from the backend while online, else from the cache.
    #[instrument(skip(self))]
    pub async fn get(&self, book_id: &str) -> Result<BookDetails> {
        let url = self.urls.book(book_id)?;
        self.cache
            .get(url.as_str())
            .await
            .ok_or_else(|| PlaybackError::BookUnavailable(book_id.to_string()))
    }

    /// Whether metadata for `book_id` is available offline.
    pub async fn is_cached(&self, book_id: &str) -> Result<bool> {
        let url = self.urls.book(book_id)?;
        Ok(self.cache.has(url.as_str()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{error::Result as BridgeResult, HttpRequest, HttpResponse};
    use core_cache::MemoryCollectionStore;
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    #[test]
    fn test_url_layout() {
        let urls = BookUrls::new(Url::parse("https://api.example.com/v1").unwrap());
        assert_eq!(
            urls.book("b1").unwrap().as_str(),
            "https://api.example.com/v1/books/b1"
        );
        assert_eq!(
            urls.manifest("b1").unwrap().as_str(),
            "https://api.example.com/v1/books/b1/m3u8"
        );
        assert_eq!(
            urls.progress("b1").unwrap().as_str(),
            "https://api.example.com/v1/books/b1/progress"
        );
    }

    #[core_async::test]
    async fn test_get_caches_for_offline_use() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| request.url == "https://api/books/b1")
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"id":"b1","title":"Dune","pdf_file_name":"dune.pdf","status":"ready"}"#,
                ))
            });

        let connectivity = Connectivity::online();
        let repository = BooksRepository::new(
            Arc::new(http),
            Arc::new(MemoryCollectionStore::new()),
            connectivity.clone(),
            BookUrls::new(Url::parse("https://api/").unwrap()),
            &CacheConfig::default(),
        )
        .unwrap();

        assert_eq!(repository.get("b1").await.unwrap().title, "Dune");

        connectivity.set_online(false);
        assert!(repository.is_cached("b1").await.unwrap());
        assert_eq!(repository.get("b1").await.unwrap().status, "ready");
        assert!(matches!(
            repository.get("b2").await,
            Err(PlaybackError::BookUnavailable(_))
        ));
    }
}
