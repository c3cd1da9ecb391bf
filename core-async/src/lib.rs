//! Async runtime facade for the Narration Platform Core.
//!
//! Every core crate reaches tokio through this crate so that the runtime
//! surface (spawning, timers, channels, cancellation) is declared in one place
//! and test helpers such as paused clocks are wired consistently.
//!
//! # Modules
//!
//! - `task`: task spawning and join handles
//! - `time`: sleeps, intervals, timeouts and the runtime-aware `Instant`
//! - `sync`: channels, locks and `CancellationToken`
//! - `runtime`: `block_on` helpers used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};

/// Waits on multiple concurrent branches, returning when the first completes.
pub use tokio::select;
