//! # Event Bus System
//!
//! Typed events broadcast between the narration core and its host using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────┐   emit    ┌───────────┐
//! │ PlaybackEngine  ├──────────>│           │
//! └─────────────────┘           │           │   subscribe   ┌────────────┐
//! ┌─────────────────┐   emit    │ EventBus  ├──────────────>│ Host UI    │
//! │ OfflineCache    ├──────────>│ (broadcast│               └────────────┘
//! └─────────────────┘           │  channel) │   subscribe   ┌────────────┐
//! ┌─────────────────┐   emit    │           ├──────────────>│ Diagnostics│
//! │ Downloads       ├──────────>│           │               └────────────┘
//! └─────────────────┘           └───────────┘
//! ```
//!
//! Components take an optional bus (`with_event_bus`); emitting with no
//! subscribers is not an error worth reporting, so emitters ignore the
//! `SendError`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DownloadEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut downloads =
//!     EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Download(_)));
//!
//! bus.emit(CoreEvent::Download(DownloadEvent::Completed {
//!     book_id: "b1".to_string(),
//!     fragments_total: 10,
//! }))
//! .ok();
//!
//! let event = downloads.recv().await.unwrap();
//! assert_eq!(event.description(), "Download completed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber was too slow and missed `n`
//!   events. Non-fatal.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Playback(PlaybackEvent),
    Cache(CacheEvent),
    Download(DownloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Playback(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Playback(PlaybackEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Download(DownloadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::TimelineMissing { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::SyncAbandoned { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::Reconciled { .. }) => EventSeverity::Info,
            CoreEvent::Playback(PlaybackEvent::BookLoaded { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Playback Events
// ============================================================================

/// Events emitted by the playback engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// The manifest attached and the section timeline was built.
    BookLoaded {
        book_id: String,
        section_count: usize,
        /// Sum of all section durations in seconds.
        duration_seconds: f64,
    },
    /// The manifest carried no section metadata; section navigation is
    /// disabled for this book.
    TimelineMissing { book_id: String },
    Started {
        book_id: String,
        position_seconds: f64,
    },
    Paused {
        book_id: String,
        position_seconds: f64,
    },
    /// The section under the play cursor changed.
    SectionChanged {
        book_id: String,
        section_id: Option<i64>,
    },
    RateChanged { book_id: String, rate: f64 },
    /// A progress snapshot was handed to the progress cache.
    ProgressSaved {
        book_id: String,
        section_id: i64,
        section_progress_seconds: f64,
    },
    /// An operation failed. `recoverable == false` means the book cannot be
    /// played in this session (for example the manifest did not attach).
    Error {
        book_id: Option<String>,
        message: String,
        recoverable: bool,
    },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::BookLoaded { .. } => "Book loaded",
            PlaybackEvent::TimelineMissing { .. } => "Book has no section metadata",
            PlaybackEvent::Started { .. } => "Playback started",
            PlaybackEvent::Paused { .. } => "Playback paused",
            PlaybackEvent::SectionChanged { .. } => "Section changed",
            PlaybackEvent::RateChanged { .. } => "Playback rate changed",
            PlaybackEvent::ProgressSaved { .. } => "Progress saved",
            PlaybackEvent::Error {
                recoverable: false, ..
            } => "Unable to play this book",
            PlaybackEvent::Error { .. } => "Playback error",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events emitted by offline-aware caches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A write was stored locally and waits for connectivity.
    EntryQueued { collection: String, key: String },
    /// A reconciliation pass finished.
    Reconciled {
        collection: String,
        synced: usize,
        still_pending: usize,
    },
    /// A pending write hit the attempt cap and will no longer be retried.
    SyncAbandoned {
        collection: String,
        key: String,
        attempts: u32,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::EntryQueued { .. } => "Write queued for sync",
            CacheEvent::Reconciled { .. } => "Pending writes reconciled",
            CacheEvent::SyncAbandoned { .. } => "Pending write abandoned",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

/// Events emitted by the download orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    Started {
        book_id: String,
        fragments_total: u64,
    },
    /// Sampled progress; not every fragment completion produces one.
    Progress {
        book_id: String,
        fragments_total: u64,
        fragments_downloaded: u64,
    },
    Completed {
        book_id: String,
        fragments_total: u64,
    },
    Failed { book_id: String, message: String },
    Cancelled {
        book_id: String,
        fragments_downloaded: u64,
    },
    /// Cached fragments and the status record were removed.
    Deleted {
        book_id: String,
        fragments_evicted: u64,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::Started { .. } => "Download started",
            DownloadEvent::Progress { .. } => "Download in progress",
            DownloadEvent::Completed { .. } => "Download completed",
            DownloadEvent::Failed { .. } => "Download failed",
            DownloadEvent::Cancelled { .. } => "Download cancelled",
            DownloadEvent::Deleted { .. } => "Downloaded data deleted",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of receivers, or `SendError` when nobody listens.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper with an optional predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event matching the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when no
    /// matching event is buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
