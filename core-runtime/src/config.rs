//! # Core Configuration Module
//!
//! Builder-based configuration for the narration core.
//!
//! ## Overview
//!
//! `CoreConfig` carries the backend location and every host capability the
//! core needs. `build()` validates eagerly, so a missing capability is
//! reported at startup with an actionable message instead of failing on the
//! first request.
//!
//! ## Required
//!
//! - API base URL (`https://host/api`); all resource URLs hang off it
//! - `HttpClient` (desktop default: reqwest)
//! - `CollectionStore` (desktop default: SQLite at the database path)
//!
//! ## Optional
//!
//! - `NetworkMonitor`: required when network awareness is enabled
//!   (desktop default: TCP probe)
//! - `Clock`: defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .api_base_url("https://narration.example.com/api")
//!     .http_client(Arc::new(MyHttpClient))
//!     .collection_store(Arc::new(MyStore))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! // Without desktop defaults: Err(Error::CapabilityMissing { capability: "HttpClient", .. })
//! let result = CoreConfig::builder()
//!     .api_base_url("https://narration.example.com/api")
//!     .build();
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, CollectionStore, HttpClient, NetworkMonitor, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

/// Core configuration for the narration core.
#[derive(Clone)]
pub struct CoreConfig {
    /// Backend root, always ending in `/` so relative joins keep the path
    pub api_base_url: Url,

    /// SQLite file used by the default collection store
    pub database_path: Option<PathBuf>,

    pub http_client: Arc<dyn HttpClient>,

    /// Storage behind every local cache
    pub collection_store: Arc<dyn CollectionStore>,

    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    pub clock: Arc<dyn Clock>,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("database_path", &self.database_path)
            .field("http_client", &"HttpClient { ... }")
            .field("collection_store", &"CollectionStore { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("features", &self.features)
            .finish()
    }
}

/// Feature toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Drive the caches' connectivity signal from a `NetworkMonitor`.
    /// When off, the host flips connectivity itself.
    pub enable_network_awareness: bool,

    /// Replay pending writes automatically on offline-to-online transitions.
    pub enable_background_reconcile: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_network_awareness: false,
            enable_background_reconcile: true,
        }
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.api_base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "API base URL must be http(s), got '{}'",
                self.api_base_url.scheme()
            )));
        }

        if let Some(path) = &self.database_path {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.features.enable_network_awareness && self.network_monitor.is_none() {
            return Err(Error::Config(
                "Network awareness enabled but no NetworkMonitor provided. \
                 Disable the feature or inject a NetworkMonitor implementation."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve a path relative to the API base (`books/7/m3u8`).
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", path, e)))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid API base URL '{}': {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "An HttpClient is required for book, manifest and fragment requests. \
                 Desktop: enable the 'desktop-shims' feature to use ReqwestHttpClient. \
                 Other hosts: inject the platform HTTP stack."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn collection_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "CollectionStore".to_string(),
        message: "A CollectionStore is required for the offline caches. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteCollectionStore. \
                 Other hosts: inject durable key/value storage."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    let client = bridge_desktop::ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_collection_store(
    database_path: Option<&PathBuf>,
) -> Result<(Arc<dyn CollectionStore>, PathBuf)> {
    use bridge_desktop::SqliteCollectionStore;
    use std::thread;
    use tokio::runtime::{Handle, Runtime};

    let path = match database_path {
        Some(path) => path.clone(),
        None => bridge_desktop::default_database_path()
            .map_err(|e| Error::Config(format!("No database path and no default: {}", e)))?,
    };

    let init_store = |path: PathBuf| -> Result<SqliteCollectionStore> {
        let runtime = Runtime::new().map_err(|e| {
            Error::Internal(format!(
                "Failed to create Tokio runtime for default CollectionStore: {}",
                e
            ))
        })?;

        runtime
            .block_on(SqliteCollectionStore::new(path))
            .map_err(|e| {
                Error::Internal(format!("Failed to initialize default CollectionStore: {}", e))
            })
    };

    // block_on panics inside a runtime, so initialize on a scratch thread there
    let store = match Handle::try_current() {
        Ok(_) => {
            let candidate = path.clone();
            thread::spawn(move || init_store(candidate))
                .join()
                .map_err(|_| {
                    Error::Internal(
                        "Worker thread panicked while creating default CollectionStore"
                            .to_string(),
                    )
                })??
        }
        Err(_) => init_store(path.clone())?,
    };

    Ok((Arc::new(store), path))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_collection_store(
    _database_path: Option<&PathBuf>,
) -> Result<(Arc<dyn CollectionStore>, PathBuf)> {
    Err(collection_store_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

/// Builder for [`CoreConfig`]
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    database_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    collection_store: Option<Arc<dyn CollectionStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn collection_store(mut self, store: Arc<dyn CollectionStore>) -> Self {
        self.collection_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn enable_network_awareness(mut self, enabled: bool) -> Self {
        self.features.enable_network_awareness = enabled;
        self
    }

    pub fn enable_background_reconcile(mut self, enabled: bool) -> Self {
        self.features.enable_background_reconcile = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// - `Error::Config` for a missing or malformed base URL, or a feature
    ///   enabled without the capability it needs
    /// - `Error::CapabilityMissing` when a required bridge has no default
    pub fn build(self) -> Result<CoreConfig> {
        let raw_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;
        let api_base_url = parse_base_url(&raw_url)?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let (collection_store, database_path) = match self.collection_store {
            Some(store) => (store, self.database_path),
            None => {
                let (store, path) = provide_default_collection_store(self.database_path.as_ref())?;
                (store, Some(path))
            }
        };

        let network_monitor = match self.network_monitor {
            Some(monitor) => Some(monitor),
            None if self.features.enable_network_awareness => provide_default_network_monitor(),
            None => None,
        };

        let config = CoreConfig {
            api_base_url,
            database_path,
            http_client,
            collection_store,
            network_monitor,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            features: self.features,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{
        error::Result as BridgeResult, HttpRequest, HttpResponse, NetworkChangeStream,
        NetworkInfo, StoredEntry,
    };

    struct StubHttp;

    #[async_trait]
    impl HttpClient for StubHttp {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    struct StubStore;

    #[async_trait]
    impl CollectionStore for StubStore {
        async fn get(&self, _c: &str, _k: &str) -> BridgeResult<Option<StoredEntry>> {
            Ok(None)
        }
        async fn put(&self, _c: &str, _e: StoredEntry) -> BridgeResult<()> {
            Ok(())
        }
        async fn delete(&self, _c: &str, _k: &str) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn update_sync_state(
            &self,
            _c: &str,
            _k: &str,
            _p: &[u8],
            _s: bool,
            _a: u32,
        ) -> BridgeResult<bool> {
            Ok(false)
        }
        async fn list(&self, _c: &str) -> BridgeResult<Vec<StoredEntry>> {
            Ok(Vec::new())
        }
        async fn clear(&self, _c: &str) -> BridgeResult<()> {
            Ok(())
        }
    }

    struct StubMonitor;

    #[async_trait]
    impl NetworkMonitor for StubMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::disconnected())
        }
        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            Err(bridge_traits::BridgeError::NotAvailable("changes".to_string()))
        }
    }

    fn stubbed() -> CoreConfigBuilder {
        CoreConfig::builder()
            .api_base_url("https://narration.example.com/api")
            .http_client(Arc::new(StubHttp))
            .collection_store(Arc::new(StubStore))
    }

    #[test]
    fn test_builder_requires_base_url() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(StubHttp))
            .collection_store(Arc::new(StubStore))
            .build();

        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("api_base_url")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_builder_rejects_malformed_base_url() {
        let result = stubbed().api_base_url("not a url").build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = stubbed().api_base_url("ftp://example.com/api").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let config = stubbed().build().unwrap();

        assert_eq!(
            config.endpoint("books/7/m3u8").unwrap().as_str(),
            "https://narration.example.com/api/books/7/m3u8"
        );
        assert_eq!(
            config.endpoint("/books/7").unwrap().as_str(),
            "https://narration.example.com/api/books/7"
        );
    }

    #[test]
    fn test_default_feature_flags() {
        let config = stubbed().build().unwrap();
        assert!(!config.features.enable_network_awareness);
        assert!(config.features.enable_background_reconcile);
        assert!(config.network_monitor.is_none());
    }

    #[test]
    fn test_network_awareness_with_monitor() {
        let config = stubbed()
            .network_monitor(Arc::new(StubMonitor))
            .enable_network_awareness(true)
            .build()
            .unwrap();
        assert!(config.network_monitor.is_some());
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_network_awareness_requires_monitor() {
        let result = stubbed().enable_network_awareness(true).build();
        match result {
            Err(Error::Config(msg)) => assert!(msg.contains("NetworkMonitor")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_collection_store() {
        let result = CoreConfig::builder()
            .api_base_url("https://narration.example.com/api")
            .http_client(Arc::new(StubHttp))
            .build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "CollectionStore")
            }
            other => panic!("expected capability error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[tokio::test]
    async fn test_desktop_defaults_inside_runtime() {
        let dir = std::env::temp_dir().join(format!("npc-config-{}", uuid::Uuid::new_v4()));
        let db_path = dir.join("cache.db");

        let config = CoreConfig::builder()
            .api_base_url("https://narration.example.com/api")
            .database_path(&db_path)
            .build()
            .expect("desktop defaults should succeed inside runtime");

        assert_eq!(config.database_path.as_deref(), Some(db_path.as_path()));
        assert!(db_path.exists());

        drop(config);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
