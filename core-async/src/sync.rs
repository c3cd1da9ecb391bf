//! Synchronization primitives.
//!
//! Re-exports of Tokio's async-aware primitives plus `CancellationToken` from
//! `tokio-util`, which components use to stop background loops (playback
//! cadences, reconciliation, downloads) on teardown.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{watch, CancellationToken};
//!
//! async fn example() {
//!     let (tx, mut rx) = watch::channel(false);
//!     let token = CancellationToken::new();
//!
//!     tx.send_replace(true);
//!     rx.changed().await.unwrap();
//!     assert!(*rx.borrow());
//!
//!     token.cancel();
//!     token.cancelled().await;
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Mutex, MutexGuard, Notify, OwnedMutexGuard,
    OwnedSemaphorePermit, RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore,
    SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
