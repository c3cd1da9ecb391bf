//! # Desktop Bridge Implementations
//!
//! Default implementations of the bridge traits for desktop hosts
//! (macOS, Windows, Linux).
//!
//! - `HttpClient` using `reqwest`
//! - `CollectionStore` using a single SQLite table partitioned by collection
//! - `NetworkMonitor` using a TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteCollectionStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http = ReqwestHttpClient::new()?;
//!     let store = SqliteCollectionStore::new(bridge_desktop::default_database_path()?).await?;
//!     let network = DesktopNetworkMonitor::new();
//!     // hand these to core-service
//!     Ok(())
//! }
//! ```

mod http;
mod network;
mod store;

pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;
pub use store::{default_database_path, SqliteCollectionStore};
