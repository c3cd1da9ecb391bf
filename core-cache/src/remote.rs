//! Remote side of an offline-aware cache.
//!
//! A cache key is the URL of the remote resource, so the HTTP adapters
//! simply issue the request against the key.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use bridge_traits::{HttpClient, HttpMethod, HttpRequest};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Fetches the authoritative value for a key.
#[async_trait]
pub trait EntryLoader<T>: Send + Sync {
    async fn load(&self, key: &str) -> Result<T>;
}

/// Pushes a locally written value to the backend.
#[async_trait]
pub trait EntryWriter<T>: Send + Sync {
    async fn write(&self, key: &str, value: &T) -> Result<()>;
}

fn remote_error(key: &str, error: bridge_traits::BridgeError) -> CacheError {
    CacheError::Remote {
        key: key.to_string(),
        message: error.to_string(),
    }
}

/// `GET {key}` decoded as JSON
pub struct HttpJsonLoader<T> {
    http: Arc<dyn HttpClient>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpJsonLoader<T> {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> EntryLoader<T> for HttpJsonLoader<T>
where
    T: DeserializeOwned + Send + Sync,
{
    #[instrument(skip(self))]
    async fn load(&self, key: &str) -> Result<T> {
        let response = self
            .http
            .execute(HttpRequest::get(key))
            .await
            .map_err(|e| remote_error(key, e))?;

        if !response.is_success() {
            return Err(CacheError::Http {
                key: key.to_string(),
                status: response.status,
            });
        }

        response.json().map_err(|e| remote_error(key, e))
    }
}

/// Sends the value as a JSON body to `{key}`; `POST` unless configured
/// otherwise.
pub struct HttpJsonWriter<T> {
    http: Arc<dyn HttpClient>,
    method: HttpMethod,
    _marker: PhantomData<fn(&T)>,
}

impl<T> HttpJsonWriter<T> {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            method: HttpMethod::Post,
            _marker: PhantomData,
        }
    }

    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }
}

#[async_trait]
impl<T> EntryWriter<T> for HttpJsonWriter<T>
where
    T: Serialize + Send + Sync,
{
    #[instrument(skip(self, value))]
    async fn write(&self, key: &str, value: &T) -> Result<()> {
        let request = HttpRequest::new(self.method, key)
            .json(value)
            .map_err(|e| remote_error(key, e))?;
        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| remote_error(key, e))?;

        if !response.is_success() {
            return Err(CacheError::Http {
                key: key.to_string(),
                status: response.status,
            });
        }
        debug!(status = response.status, "Remote write acknowledged");
        Ok(())
    }
}
