//! # Offline Cache Module
//!
//! Persistent, collection-scoped storage of serializable values plus an
//! offline-aware read/write cache on top of it.
//!
//! ## Overview
//!
//! This module handles:
//! - Typed access to named collections of a [`CollectionStore`](bridge_traits::CollectionStore)
//! - A shared online/offline signal fed by the platform network monitor
//! - Read-through loading and write-behind syncing with replay on reconnect
//! - An in-memory store for tests and ephemeral sessions

pub mod config;
pub mod connectivity;
pub mod error;
pub mod memory;
pub mod offline;
pub mod persistent;
pub mod remote;

pub use config::CacheConfig;
pub use connectivity::Connectivity;
pub use error::{CacheError, Result};
pub use memory::MemoryCollectionStore;
pub use offline::{OfflineCache, OfflineCacheBuilder, ReconcileReport, Stamped, WriteOutcome};
pub use persistent::{CachedValue, PersistentCache};
pub use remote::{EntryLoader, EntryWriter, HttpJsonLoader, HttpJsonWriter};
