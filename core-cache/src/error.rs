use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Failed to encode or decode entry '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Remote request for '{key}' failed with status {status}")]
    Http { key: String, status: u16 },

    #[error("Remote request for '{key}' failed: {message}")]
    Remote { key: String, message: String },

    #[error("Invalid cache configuration: {0}")]
    Config(String),
}

impl CacheError {
    /// Failures of the local store, as opposed to the remote side.
    pub fn is_storage(&self) -> bool {
        matches!(self, CacheError::Storage(_))
    }

    /// Remote failures worth trying again later: transport errors, 5xx
    /// and 429. A 4xx is the backend rejecting the value.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Remote { .. } => true,
            CacheError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
