//! # Playback & Streaming Module
//!
//! Streams segmented narration audio, tracks the listener's position against
//! the book's sections and keeps books playable offline.
//!
//! ## Overview
//!
//! This module handles:
//! - Manifest parsing and the section timeline derived from its metadata ranges
//! - Cache-first manifest, fragment and file loaders, with retry for files
//! - The playback engine and its progress reporting
//! - Downloading whole books into the fragment cache

pub mod books;
pub mod config;
pub mod download;
pub mod engine;
pub mod error;
pub mod headless;
pub mod loader;
pub mod manifest;
pub mod models;
pub mod progress;
pub mod streaming;
pub mod timeline;
pub mod traits;

pub use books::{BookUrls, BooksRepository};
pub use config::{DownloadConfig, FileRetryConfig, PlaybackConfig};
pub use download::DownloadOrchestrator;
pub use engine::{PlaybackEngine, PlaybackEngineBuilder};
pub use error::{LoadError, PlaybackError, Result};
pub use headless::{HeadlessMediaFactory, VirtualClockMedia};
pub use loader::{
    CachingLoader, FileLoader, HttpLoader, Loader, LoaderContext, LoaderResponse, ResourceKind,
};
pub use manifest::{Fragment, Manifest};
pub use models::{
    BookDetails, DownloadInfo, PlaybackPosition, PlaybackStatus, ProgressRecord, ProgressUpdate,
    Section,
};
pub use progress::{ProgressSink, ProgressStore, ProgressStoreBuilder};
pub use streaming::StreamingClient;
pub use timeline::{SectionRange, SectionTimeline};
pub use traits::{MediaFactory, MediaResource, MediaSource};
