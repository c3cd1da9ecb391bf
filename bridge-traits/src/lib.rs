//! # Host Bridge Traits
//!
//! Capability traits that a host platform implements for the narration core.
//!
//! ## Overview
//!
//! The core never talks to sockets, databases or the OS directly. Each
//! capability it needs is expressed as a trait here and injected as an
//! `Arc<dyn Trait>` when components are constructed.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP with retry policies
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection and change stream
//!
//! ### Storage
//! - [`CollectionStore`](storage::CollectionStore) - Per-collection key/value entries backing
//!   every local cache (books, files, fragments, playlists, playback and download state)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing and cache freshness
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! convert platform errors into it and keep the message actionable (include
//! the collection, key or URL involved).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind `Arc`.

pub mod error;
pub mod http;
pub mod network;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType};
pub use storage::{CollectionStore, StoredEntry};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
