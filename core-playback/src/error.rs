//! # Playback Error Types
//!
//! Errors for the streaming loaders and the playback engine.

use core_cache::CacheError;
use thiserror::Error;

// ============================================================================
// Loader Errors
// ============================================================================

/// Failure of a single manifest/fragment/file load.
///
/// Caching loaders pass these through untouched. Only the file loader turns
/// an exhausted retry budget into [`LoadError::GatewayTimeout`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Transport-level failure (DNS, connection reset, TLS).
    #[error("Network error loading {url}: {message}")]
    Network { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} loading {url}")]
    Http { url: String, status: u16 },

    #[error("Timed out loading {url}")]
    Timeout { url: String },

    /// The caller gave up on the load.
    #[error("Load of {url} was aborted")]
    Aborted { url: String },

    /// Terminal failure after the retry budget was spent.
    #[error("Gave up loading {url} after {attempts} attempts")]
    GatewayTimeout { url: String, attempts: u32 },

    #[error("Cache error for {url}: {message}")]
    Cache { url: String, message: String },

    /// The body could not be interpreted (bad manifest, bad encoding).
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

impl LoadError {
    /// Returns `true` if another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Network { .. } | LoadError::Timeout { .. } => true,
            LoadError::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// HTTP-like status code for reporting, where one applies.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LoadError::Http { status, .. } => Some(*status),
            LoadError::GatewayTimeout { .. } => Some(504),
            _ => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            LoadError::Network { url, .. }
            | LoadError::Http { url, .. }
            | LoadError::Timeout { url }
            | LoadError::Aborted { url }
            | LoadError::GatewayTimeout { url, .. }
            | LoadError::Cache { url, .. }
            | LoadError::InvalidResponse { url, .. } => url,
        }
    }
}

// ============================================================================
// Playback Errors
// ============================================================================

/// Errors that can occur during playback and download operations.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The manifest could not be loaded or attached; playback stays inert.
    #[error("Unable to play book {book_id}: {source}")]
    StreamUnavailable {
        book_id: String,
        #[source]
        source: LoadError,
    },

    /// Attempted a transport operation before a book was attached.
    #[error("No book loaded")]
    NoBookLoaded,

    /// The operation does not apply in the current state; nothing changed.
    #[error("Invalid playback state: {0}")]
    InvalidState(String),

    /// Book metadata could not be obtained from the backend or the cache.
    #[error("Book unavailable: {0}")]
    BookUnavailable(String),

    #[error("Media resource error: {0}")]
    Media(String),

    #[error("Download of book {0} was cancelled")]
    Cancelled(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PlaybackError {
    /// Returns `true` if retrying the operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PlaybackError::Load(e) => e.is_retryable() || matches!(e, LoadError::GatewayTimeout { .. }),
            PlaybackError::StreamUnavailable { source, .. } => {
                source.is_retryable() || matches!(source, LoadError::GatewayTimeout { .. })
            }
            PlaybackError::BookUnavailable(_) => true,
            PlaybackError::Cache(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
