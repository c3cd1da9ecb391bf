//! # Streaming Loaders
//!
//! The loader contract plugged into the streaming client's manifest and
//! fragment slots, plus its implementations:
//!
//! - [`HttpLoader`]: plain network fetch through the host `HttpClient`
//! - [`CachingLoader`]: cache-first wrapper over another loader
//! - [`FileLoader`]: cache-first with bounded exponential backoff, used for
//!   fragments and other files that downloads share with playback

mod caching;
mod file;

pub use caching::CachingLoader;
pub use file::FileLoader;

use crate::error::LoadError;
use async_trait::async_trait;
use bridge_traits::{BridgeError, HttpClient, HttpRequest};
use bytes::Bytes;
use core_async::sync::CancellationToken;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What a load is for. Selects the cache collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Manifest,
    Fragment,
    File,
}

impl ResourceKind {
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Manifest => "playlists",
            ResourceKind::Fragment => "fragments",
            ResourceKind::File => "files",
        }
    }
}

/// One load request.
#[derive(Debug, Clone)]
pub struct LoaderContext {
    pub url: String,
    pub kind: ResourceKind,
    /// Cancelling aborts the load with [`LoadError::Aborted`].
    pub cancel: CancellationToken,
}

impl LoaderContext {
    pub fn new(kind: ResourceKind, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            cancel: CancellationToken::new(),
        }
    }

    pub fn manifest(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Manifest, url)
    }

    pub fn fragment(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::Fragment, url)
    }

    pub fn file(url: impl Into<String>) -> Self {
        Self::new(ResourceKind::File, url)
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn aborted(&self) -> LoadError {
        LoadError::Aborted {
            url: self.url.clone(),
        }
    }
}

/// A loaded resource. Serializable so it can be cached as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderResponse {
    pub url: String,
    #[serde(with = "base64_body")]
    pub data: Bytes,
}

impl LoaderResponse {
    pub fn new(url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            data: data.into(),
        }
    }

    pub fn text(&self) -> Result<&str, LoadError> {
        std::str::from_utf8(&self.data).map_err(|e| LoadError::InvalidResponse {
            url: self.url.clone(),
            message: e.to_string(),
        })
    }
}

mod base64_body {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// Pluggable loader slot of the streaming client.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError>;
}

// ============================================================================
// HttpLoader
// ============================================================================

/// Network-only loader.
pub struct HttpLoader {
    http: Arc<dyn HttpClient>,
}

impl HttpLoader {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }
}

fn transport_error(url: &str, error: BridgeError) -> LoadError {
    match error {
        BridgeError::Timeout(_) => LoadError::Timeout {
            url: url.to_string(),
        },
        other => LoadError::Network {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl Loader for HttpLoader {
    #[instrument(skip(self, context), fields(url = %context.url))]
    async fn load(&self, context: &LoaderContext) -> Result<LoaderResponse, LoadError> {
        let request = HttpRequest::get(context.url.clone());
        let response = core_async::select! {
            biased;
            _ = context.cancel.cancelled() => return Err(context.aborted()),
            result = self.http.execute(request) => {
                result.map_err(|e| transport_error(&context.url, e))?
            }
        };

        if !response.is_success() {
            return Err(LoadError::Http {
                url: context.url.clone(),
                status: response.status,
            });
        }

        debug!(bytes = response.body.len(), "Loaded");
        Ok(LoaderResponse::new(context.url.clone(), response.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::{error::Result as BridgeResult, HttpResponse};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    #[core_async::test]
    async fn test_http_loader_success() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| request.url == "https://cdn/a.ts")
            .times(1)
            .returning(|_| Ok(HttpResponse::new(200, vec![1u8, 2, 3])));

        let loader = HttpLoader::new(Arc::new(http));
        let response = loader
            .load(&LoaderContext::fragment("https://cdn/a.ts"))
            .await
            .unwrap();

        assert_eq!(response.data.as_ref(), &[1, 2, 3]);
    }

    #[core_async::test]
    async fn test_http_loader_maps_errors() {
        let mut http = MockHttpClient::new();
        http.expect_execute()
            .withf(|request| request.url.ends_with("missing.ts"))
            .returning(|_| Ok(HttpResponse::new(404, Vec::new())));
        http.expect_execute()
            .withf(|request| request.url.ends_with("slow.ts"))
            .returning(|_| Err(BridgeError::Timeout("read".to_string())));

        let loader = HttpLoader::new(Arc::new(http));

        let missing = loader
            .load(&LoaderContext::fragment("https://cdn/missing.ts"))
            .await
            .unwrap_err();
        assert_eq!(missing.status_code(), Some(404));

        let slow = loader
            .load(&LoaderContext::fragment("https://cdn/slow.ts"))
            .await
            .unwrap_err();
        assert!(matches!(slow, LoadError::Timeout { .. }));
    }

    #[core_async::test]
    async fn test_cancelled_context_aborts() {
        let mut http = MockHttpClient::new();
        http.expect_execute().returning(|_| Ok(HttpResponse::new(200, Vec::new())));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let loader = HttpLoader::new(Arc::new(http));
        let err = loader
            .load(&LoaderContext::fragment("https://cdn/a.ts").with_cancel(cancel))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Aborted { .. }));
    }

    #[test]
    fn test_response_body_is_base64_in_json() {
        let response = LoaderResponse::new("u", vec![0xffu8, 0x00]);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["data"], "/wA=");
        let back: LoaderResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, response);
    }
}
