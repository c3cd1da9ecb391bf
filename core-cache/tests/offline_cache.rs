//! Offline cache behaviour across connectivity changes

use async_trait::async_trait;
use bridge_traits::{CollectionStore, ManualClock};
use core_cache::{
    CacheConfig, CacheError, Connectivity, EntryLoader, EntryWriter, MemoryCollectionStore,
    OfflineCache, WriteOutcome,
};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Progress {
    section_id: i64,
    seconds: f64,
}

fn progress(section_id: i64, seconds: f64) -> Progress {
    Progress {
        section_id,
        seconds,
    }
}

#[derive(Default)]
struct RecordingWriter {
    writes: Mutex<Vec<(String, Progress)>>,
    failing: AtomicBool,
    rejected_key: Mutex<Option<String>>,
}

impl RecordingWriter {
    fn failing() -> Self {
        let writer = Self::default();
        writer.failing.store(true, Ordering::SeqCst);
        writer
    }

    fn rejecting(key: &str) -> Self {
        let writer = Self::default();
        *writer.rejected_key.lock() = Some(key.to_string());
        writer
    }

    fn writes(&self) -> Vec<(String, Progress)> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl EntryWriter<Progress> for RecordingWriter {
    async fn write(&self, key: &str, value: &Progress) -> core_cache::Result<()> {
        let rejected = self.rejected_key.lock().as_deref() == Some(key);
        if rejected || self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Remote {
                key: key.to_string(),
                message: "connection reset".to_string(),
            });
        }
        self.writes.lock().push((key.to_string(), value.clone()));
        Ok(())
    }
}

struct FixedLoader {
    value: Option<Progress>,
    calls: AtomicUsize,
}

impl FixedLoader {
    fn returning(value: Progress) -> Self {
        Self {
            value: Some(value),
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            value: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EntryLoader<Progress> for FixedLoader {
    async fn load(&self, key: &str) -> core_cache::Result<Progress> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.value.clone().ok_or_else(|| CacheError::Http {
            key: key.to_string(),
            status: 503,
        })
    }
}

async fn wait_for_pending(cache: &OfflineCache<Progress>, expected: usize) {
    for _ in 0..200 {
        if cache.pending_count().await.unwrap() == expected {
            return;
        }
        core_async::sleep(Duration::from_millis(5)).await;
    }
    panic!("pending count never reached {expected}");
}

#[core_async::test]
async fn test_offline_set_is_readable_and_pending() {
    let store = Arc::new(MemoryCollectionStore::new());
    let connectivity = Connectivity::offline();
    let writer = Arc::new(RecordingWriter::default());
    let cache = OfflineCache::builder(store.clone(), connectivity, "progress")
        .writer(writer.clone())
        .build()
        .unwrap();

    let outcome = cache.set("/books/1/progress", &progress(3, 12.5)).await;

    assert_eq!(outcome, WriteOutcome::Queued);
    assert_eq!(
        cache.get("/books/1/progress").await,
        Some(progress(3, 12.5))
    );
    assert_eq!(cache.pending_count().await.unwrap(), 1);
    assert!(writer.writes().is_empty());
    let stored = store.get("progress", "/books/1/progress").await.unwrap().unwrap();
    assert!(stored.sync_when_online);
}

#[core_async::test]
async fn test_reconnect_replays_and_clears_pending_flag() {
    let store = Arc::new(MemoryCollectionStore::new());
    let connectivity = Connectivity::offline();
    let writer = Arc::new(RecordingWriter::default());
    let cache = OfflineCache::builder(store.clone(), connectivity.clone(), "progress")
        .writer(writer.clone())
        .build()
        .unwrap();

    cache.set("/books/1/progress", &progress(3, 12.5)).await;
    cache.set("/books/2/progress", &progress(1, 0.0)).await;

    connectivity.set_online(true);
    wait_for_pending(&cache, 0).await;

    let mut writes = writer.writes();
    writes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        writes,
        vec![
            ("/books/1/progress".to_string(), progress(3, 12.5)),
            ("/books/2/progress".to_string(), progress(1, 0.0)),
        ]
    );
    let stored = store.get("progress", "/books/1/progress").await.unwrap().unwrap();
    assert!(!stored.sync_when_online);
}

#[core_async::test]
async fn test_cache_built_online_replays_previous_session() {
    let store: Arc<MemoryCollectionStore> = Arc::new(MemoryCollectionStore::new());
    {
        let offline = OfflineCache::builder(store.clone(), Connectivity::offline(), "progress")
            .writer(Arc::new(RecordingWriter::default()))
            .build()
            .unwrap();
        offline.set("/books/9/progress", &progress(2, 4.0)).await;
    }

    let writer = Arc::new(RecordingWriter::default());
    let cache = OfflineCache::builder(store, Connectivity::online(), "progress")
        .writer(writer.clone())
        .build()
        .unwrap();

    wait_for_pending(&cache, 0).await;
    assert_eq!(writer.writes().len(), 1);
}

#[core_async::test]
async fn test_unknown_key_offline_is_none() {
    let cache: OfflineCache<Progress> = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        Connectivity::offline(),
        "progress",
    )
    .loader(Arc::new(FixedLoader::returning(progress(1, 1.0))))
    .build()
    .unwrap();

    assert_eq!(cache.get("/books/404/progress").await, None);
}

#[core_async::test]
async fn test_online_get_caches_loaded_value() {
    let connectivity = Connectivity::online();
    let loader = Arc::new(FixedLoader::returning(progress(4, 40.0)));
    let cache = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        connectivity.clone(),
        "progress",
    )
    .loader(loader.clone())
    .build()
    .unwrap();

    assert_eq!(cache.get("/books/1/progress").await, Some(progress(4, 40.0)));

    connectivity.set_online(false);
    assert_eq!(cache.get("/books/1/progress").await, Some(progress(4, 40.0)));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    assert!(cache.has("/books/1/progress").await.unwrap());
}

#[core_async::test]
async fn test_loader_failure_falls_back_to_local() {
    let store = Arc::new(MemoryCollectionStore::new());
    let seeded: OfflineCache<Progress> =
        OfflineCache::builder(store.clone(), Connectivity::offline(), "progress")
            .build()
            .unwrap();
    assert_eq!(
        seeded.set("/books/1/progress", &progress(2, 2.0)).await,
        WriteOutcome::Stored
    );

    let cache = OfflineCache::builder(store, Connectivity::online(), "progress")
        .loader(Arc::new(FixedLoader::failing()))
        .build()
        .unwrap();

    assert_eq!(cache.get("/books/1/progress").await, Some(progress(2, 2.0)));
    assert_eq!(cache.get("/books/2/progress").await, None);
}

#[core_async::test]
async fn test_pending_write_shadows_loader() {
    let store = Arc::new(MemoryCollectionStore::new());
    let connectivity = Connectivity::offline();
    let loader = Arc::new(FixedLoader::returning(progress(1, 0.0)));
    let cache = OfflineCache::builder(store, connectivity.clone(), "progress")
        .loader(loader.clone())
        .writer(Arc::new(RecordingWriter::failing()))
        .background_reconcile(false)
        .build()
        .unwrap();

    cache.set("/books/1/progress", &progress(7, 70.0)).await;
    connectivity.set_online(true);

    assert_eq!(cache.get("/books/1/progress").await, Some(progress(7, 70.0)));
    assert_eq!(loader.calls.load(Ordering::SeqCst), 0);
}

#[core_async::test]
async fn test_online_set_failure_queues_entry() {
    let cache = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        Connectivity::online(),
        "progress",
    )
    .writer(Arc::new(RecordingWriter::failing()))
    .background_reconcile(false)
    .build()
    .unwrap();

    let outcome = cache.set("/books/1/progress", &progress(1, 5.0)).await;

    assert_eq!(outcome, WriteOutcome::Queued);
    assert_eq!(cache.pending_count().await.unwrap(), 1);
}

#[core_async::test]
async fn test_online_set_success_is_synced() {
    let writer = Arc::new(RecordingWriter::default());
    let cache = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        Connectivity::online(),
        "progress",
    )
    .writer(writer.clone())
    .background_reconcile(false)
    .build()
    .unwrap();

    let outcome = cache.set("/books/1/progress", &progress(1, 5.0)).await;

    assert_eq!(outcome, WriteOutcome::Synced);
    assert_eq!(cache.pending_count().await.unwrap(), 0);
    assert_eq!(writer.writes().len(), 1);
}

#[core_async::test]
async fn test_offline_reconcile_does_not_count_attempts() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let store = Arc::new(MemoryCollectionStore::new());
    let cache = OfflineCache::builder(store.clone(), Connectivity::offline(), "progress")
        .writer(Arc::new(RecordingWriter::failing()))
        .event_bus(bus)
        .background_reconcile(false)
        .build()
        .unwrap();

    cache.set("/books/1/progress", &progress(1, 5.0)).await;
    let report = cache.reconcile().await;

    assert_eq!(report.still_pending, 1);
    let stored = store.get("progress", "/books/1/progress").await.unwrap().unwrap();
    assert_eq!(stored.sync_attempts, 0);
    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::EntryQueued { .. })
    ));
}

#[core_async::test]
async fn test_one_failed_replay_does_not_block_others() {
    let store = Arc::new(MemoryCollectionStore::new());
    let connectivity = Connectivity::offline();
    let writer = Arc::new(RecordingWriter::rejecting("/books/2/progress"));
    let cache = OfflineCache::builder(store.clone(), connectivity.clone(), "progress")
        .writer(writer.clone())
        .background_reconcile(false)
        .build()
        .unwrap();

    cache.set("/books/1/progress", &progress(1, 1.0)).await;
    cache.set("/books/2/progress", &progress(2, 2.0)).await;
    cache.set("/books/3/progress", &progress(3, 3.0)).await;

    connectivity.set_online(true);
    let report = cache.reconcile().await;

    assert_eq!(report.synced, 2);
    assert_eq!(report.still_pending, 1);
    assert_eq!(cache.pending_count().await.unwrap(), 1);

    let mut synced: Vec<String> = writer.writes().into_iter().map(|(key, _)| key).collect();
    synced.sort();
    assert_eq!(synced, vec!["/books/1/progress", "/books/3/progress"]);

    let rejected = store.get("progress", "/books/2/progress").await.unwrap().unwrap();
    assert!(rejected.sync_when_online);
    assert_eq!(rejected.sync_attempts, 1);
    for key in ["/books/1/progress", "/books/3/progress"] {
        assert!(!store.get("progress", key).await.unwrap().unwrap().sync_when_online);
    }
}

#[core_async::test]
async fn test_dead_letter_after_repeated_failures() {
    let bus = EventBus::new(16);
    let mut events = bus.subscribe();
    let connectivity = Connectivity::offline();
    let cache = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        connectivity.clone(),
        "progress",
    )
    .writer(Arc::new(RecordingWriter::failing()))
    .config(CacheConfig {
        max_sync_attempts: 2,
        ..CacheConfig::default()
    })
    .event_bus(bus)
    .background_reconcile(false)
    .build()
    .unwrap();

    cache.set("/books/1/progress", &progress(1, 5.0)).await;
    connectivity.set_online(true);

    let first = cache.reconcile().await;
    assert_eq!(first.still_pending, 1);
    let second = cache.reconcile().await;
    assert_eq!(second.abandoned, 1);
    assert_eq!(cache.pending_count().await.unwrap(), 0);
    assert_eq!(cache.get("/books/1/progress").await, Some(progress(1, 5.0)));

    let mut abandoned = false;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Cache(CacheEvent::SyncAbandoned { key, attempts, .. }) = event {
            assert_eq!(key, "/books/1/progress");
            assert_eq!(attempts, 2);
            abandoned = true;
        }
    }
    assert!(abandoned);
}

#[core_async::test]
async fn test_without_writer_nothing_is_pending() {
    let connectivity = Connectivity::offline();
    let cache: OfflineCache<Progress> = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        connectivity.clone(),
        "fragments",
    )
    .build()
    .unwrap();

    assert_eq!(
        cache.set("https://cdn/a.ts", &progress(0, 0.0)).await,
        WriteOutcome::Stored
    );
    connectivity.set_online(true);
    assert_eq!(cache.pending_count().await.unwrap(), 0);
    assert_eq!(cache.reconcile().await.synced, 0);
    assert_eq!(cache.get_all().await.unwrap().len(), 1);
}

#[core_async::test]
async fn test_staleness_uses_cache_clock() {
    let clock = Arc::new(ManualClock::default());
    let cache: OfflineCache<Progress> = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        Connectivity::offline(),
        "playlists",
    )
    .clock(clock.clone())
    .build()
    .unwrap();

    cache.set("https://cdn/master.m3u8", &progress(0, 0.0)).await;
    let entry = cache.get_local("https://cdn/master.m3u8").await.unwrap();
    assert!(!cache.is_stale(&entry, Duration::from_secs(60)));

    clock.advance(Duration::from_secs(61));
    assert!(cache.is_stale(&entry, Duration::from_secs(60)));
}

#[core_async::test]
async fn test_delete_removes_pending_entry() {
    let cache = OfflineCache::builder(
        Arc::new(MemoryCollectionStore::new()),
        Connectivity::offline(),
        "progress",
    )
    .writer(Arc::new(RecordingWriter::default()))
    .background_reconcile(false)
    .build()
    .unwrap();

    cache.set("/books/1/progress", &progress(1, 5.0)).await;
    assert!(cache.delete("/books/1/progress").await.unwrap());
    assert_eq!(cache.pending_count().await.unwrap(), 0);
    assert!(!cache.has("/books/1/progress").await.unwrap());
}

#[core_async::test]
async fn test_sqlite_store_keeps_pending_writes_across_instances() {
    let store = Arc::new(bridge_desktop::SqliteCollectionStore::in_memory().await.unwrap());
    {
        let offline = OfflineCache::builder(store.clone(), Connectivity::offline(), "playback-info")
            .writer(Arc::new(RecordingWriter::default()))
            .build()
            .unwrap();
        assert_eq!(
            offline.set("/books/5/progress", &progress(7, 33.0)).await,
            WriteOutcome::Queued
        );
    }

    let writer = Arc::new(RecordingWriter::default());
    let connectivity = Connectivity::offline();
    let cache = OfflineCache::builder(store, connectivity.clone(), "playback-info")
        .writer(writer.clone())
        .build()
        .unwrap();
    assert_eq!(cache.get("/books/5/progress").await, Some(progress(7, 33.0)));
    assert_eq!(cache.pending_count().await.unwrap(), 1);

    connectivity.set_online(true);
    wait_for_pending(&cache, 0).await;
    assert_eq!(
        writer.writes(),
        vec![("/books/5/progress".to_string(), progress(7, 33.0))]
    );
}

#[core_async::test]
async fn test_debug_names_collection() {
    let cache: OfflineCache<Progress> =
        OfflineCache::builder(Arc::new(MemoryCollectionStore::new()), Connectivity::offline(), "progress")
            .writer(Arc::new(RecordingWriter::default()))
            .background_reconcile(false)
            .build()
            .unwrap();

    let rendered = format!("{cache:?}");
    assert!(rendered.contains("\"progress\""));
    assert!(rendered.contains("has_writer: true"));
}
