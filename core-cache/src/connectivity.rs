//! # Connectivity Signal
//!
//! A shared online/offline flag with change notification. Caches read it on
//! every `get`/`set` and watch it to trigger reconciliation.
//!
//! The signal is either driven by the host (`set_online`) or follows a
//! [`NetworkMonitor`] through [`Connectivity::follow`].

use bridge_traits::{error::Result as BridgeResult, NetworkMonitor};
use core_async::sync::{watch, CancellationToken};
use core_async::task::JoinHandle;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Connectivity {
    sender: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Update the flag. Subscribers are only woken on an actual change;
    /// returns whether one happened.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Build a signal that mirrors `monitor` until `shutdown` fires.
    ///
    /// The initial value comes from `get_network_info`; later values from
    /// the monitor's change stream.
    pub async fn follow(
        monitor: Arc<dyn NetworkMonitor>,
        shutdown: CancellationToken,
    ) -> BridgeResult<(Self, JoinHandle<()>)> {
        let initial = monitor.get_network_info().await?.is_online();
        let mut changes = monitor.subscribe_changes().await?;
        let connectivity = Self::new(initial);
        let signal = connectivity.clone();

        let handle = core_async::spawn(async move {
            loop {
                core_async::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Connectivity follower stopped");
                        break;
                    }
                    next = changes.next() => match next {
                        Some(info) => {
                            signal.set_online(info.is_online());
                        }
                        None => {
                            warn!("Network change stream closed; connectivity frozen");
                            break;
                        }
                    }
                }
            }
        });

        Ok((connectivity, handle))
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{NetworkChangeStream, NetworkInfo, NetworkType};
    use core_async::sync::mpsc;
    use parking_lot::Mutex;

    #[core_async::test]
    async fn test_only_real_changes_notify() {
        let connectivity = Connectivity::offline();
        let mut rx = connectivity.subscribe();

        assert!(!connectivity.set_online(false));
        assert!(!rx.has_changed().unwrap());

        assert!(connectivity.set_online(true));
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    struct ChannelStream(mpsc::UnboundedReceiver<NetworkInfo>);

    #[async_trait]
    impl NetworkChangeStream for ChannelStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            self.0.recv().await
        }
    }

    struct FakeMonitor {
        stream: Mutex<Option<ChannelStream>>,
    }

    #[async_trait]
    impl NetworkMonitor for FakeMonitor {
        async fn get_network_info(&self) -> BridgeResult<NetworkInfo> {
            Ok(NetworkInfo::disconnected())
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>> {
            let stream = self.stream.lock().take().ok_or_else(|| {
                bridge_traits::BridgeError::NotAvailable("already subscribed".to_string())
            })?;
            Ok(Box::new(stream))
        }
    }

    #[core_async::test]
    async fn test_follow_mirrors_monitor() {
        let (tx, rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(FakeMonitor {
            stream: Mutex::new(Some(ChannelStream(rx))),
        });
        let shutdown = CancellationToken::new();

        let (connectivity, handle) = Connectivity::follow(monitor, shutdown.clone())
            .await
            .unwrap();
        assert!(!connectivity.is_online());

        let mut changes = connectivity.subscribe();
        tx.send(NetworkInfo::connected(NetworkType::WiFi)).unwrap();
        changes.changed().await.unwrap();
        assert!(connectivity.is_online());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
