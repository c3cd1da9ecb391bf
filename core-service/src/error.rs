use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::BridgeError),

    #[error("Cache error: {0}")]
    Cache(#[from] core_cache::CacheError),

    #[error("Playback error: {0}")]
    Playback(#[from] core_playback::PlaybackError),
}

impl CoreError {
    /// Returns `true` if retrying the operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CoreError::Playback(e) => e.is_transient(),
            CoreError::Cache(e) => e.is_transient(),
            CoreError::Bridge(e) => e.is_network_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
