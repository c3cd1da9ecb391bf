//! Clock-driven media for hosts without audio output.
//!
//! When attached to a manifest, the resource buffers the fragment under its
//! cursor through the streaming client's fragment slot on every play and
//! seek, so cached (downloaded) fragments are what an offline session reads.

use crate::error::Result;
use crate::manifest::Manifest;
use crate::streaming::StreamingClient;
use crate::traits::{MediaFactory, MediaResource, MediaSource};
use async_trait::async_trait;
use core_async::sync::CancellationToken;
use core_async::time::Instant;
use core_runtime::logging::redact_url;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Fragments of the attached manifest laid out on the media timeline.
struct FragmentFeed {
    client: StreamingClient,
    /// `(end_time, url)` per fragment, in playback order.
    fragments: Vec<(f64, String)>,
    buffered: Mutex<Option<usize>>,
    cancel: CancellationToken,
}

impl FragmentFeed {
    fn new(client: StreamingClient, manifest: &Manifest) -> Self {
        let mut end = 0.0;
        let fragments = manifest
            .fragments
            .iter()
            .map(|fragment| {
                end += fragment.duration;
                (end, fragment.url.clone())
            })
            .collect();
        Self {
            client,
            fragments,
            buffered: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    fn index_at(&self, position: f64) -> Option<usize> {
        let index = self.fragments.partition_point(|(end, _)| *end <= position);
        (index < self.fragments.len()).then_some(index)
    }

    async fn buffer(&self, position: f64) {
        let Some(index) = self.index_at(position) else {
            return;
        };
        if *self.buffered.lock() == Some(index) {
            return;
        }
        let url = &self.fragments[index].1;
        match self.client.load_fragment(url, &self.cancel).await {
            Ok(response) => {
                debug!(index, bytes = response.data.len(), "Fragment buffered");
                *self.buffered.lock() = Some(index);
            }
            Err(e) => warn!(url = %redact_url(url), error = %e, "Fragment unavailable"),
        }
    }
}

#[derive(Debug)]
struct ClockState {
    /// Position at `anchor`, or the frozen position while paused.
    base: f64,
    anchor: Option<Instant>,
    rate: f64,
}

/// A media resource whose position advances with the runtime clock at the
/// configured rate. Uses the tokio clock, so paused test runtimes drive it.
pub struct VirtualClockMedia {
    duration: f64,
    state: Mutex<ClockState>,
    feed: Option<FragmentFeed>,
}

impl std::fmt::Debug for VirtualClockMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualClockMedia")
            .field("duration", &self.duration)
            .field("state", &self.state)
            .field("fragments", &self.feed.as_ref().map(|feed| feed.fragments.len()))
            .finish()
    }
}

impl VirtualClockMedia {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration: duration_seconds.max(0.0),
            state: Mutex::new(ClockState {
                base: 0.0,
                anchor: None,
                rate: 1.0,
            }),
            feed: None,
        }
    }

    /// Media spanning `manifest` that pulls its fragments through `client`.
    pub fn attached(client: StreamingClient, manifest: &Manifest) -> Self {
        Self {
            feed: Some(FragmentFeed::new(client, manifest)),
            ..Self::new(manifest.total_duration())
        }
    }

    async fn buffer_at(&self, position: f64) {
        if let Some(feed) = &self.feed {
            feed.buffer(position).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().anchor.is_some()
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn position_of(&self, state: &ClockState) -> f64 {
        let elapsed = state
            .anchor
            .map_or(0.0, |anchor| anchor.elapsed().as_secs_f64());
        (state.base + elapsed * state.rate).min(self.duration)
    }

    // Fold elapsed time into `base` so rate or anchor changes apply from now.
    fn rebase(&self, state: &mut ClockState) {
        state.base = self.position_of(state);
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }
}

#[async_trait]
impl MediaResource for VirtualClockMedia {
    async fn play(&self) -> Result<()> {
        let position = self.position();
        self.buffer_at(position).await;
        let mut state = self.state.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.base = self.position_of(&state);
        state.anchor = None;
        Ok(())
    }

    async fn seek(&self, position_seconds: f64) -> Result<()> {
        let target = position_seconds.clamp(0.0, self.duration);
        self.buffer_at(target).await;
        let mut state = self.state.lock();
        state.base = target;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
        Ok(())
    }

    fn set_rate(&self, rate: f64) {
        let mut state = self.state.lock();
        self.rebase(&mut state);
        state.rate = rate;
    }

    fn position(&self) -> f64 {
        let state = self.state.lock();
        self.position_of(&state)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    async fn close(&self) {
        if let Some(feed) = &self.feed {
            feed.cancel.cancel();
        }
        self.state.lock().anchor = None;
    }
}

/// Produces a [`VirtualClockMedia`] spanning the manifest's fragments and
/// reading them through the source's fragment slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessMediaFactory;

#[async_trait]
impl MediaFactory for HeadlessMediaFactory {
    async fn attach(&self, source: MediaSource) -> Result<Box<dyn MediaResource>> {
        debug!(
            book_id = %source.book_id,
            duration = source.manifest.total_duration(),
            "Attaching headless media"
        );
        Ok(Box::new(VirtualClockMedia::attached(
            source.client,
            &source.manifest,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::loader::{Loader, LoaderContext, LoaderResponse};
    use crate::manifest::Fragment;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingLoader {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Loader for CountingLoader {
        async fn load(
            &self,
            context: &LoaderContext,
        ) -> std::result::Result<LoaderResponse, LoadError> {
            self.urls.lock().push(context.url.clone());
            Ok(LoaderResponse::new(context.url.clone(), vec![1u8; 8]))
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            url: "https://cdn/b1.m3u8".to_string(),
            fragments: [("https://cdn/0.ts", 10.0), ("https://cdn/1.ts", 5.0)]
                .into_iter()
                .map(|(url, duration)| Fragment {
                    url: url.to_string(),
                    duration,
                })
                .collect(),
            sections: Vec::new(),
        }
    }

    fn close_to(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-6
    }

    #[core_async::test(start_paused = true)]
    async fn test_clock_advances_only_while_playing() {
        let media = VirtualClockMedia::new(100.0);
        core_async::sleep(Duration::from_secs(3)).await;
        assert_eq!(media.position(), 0.0);

        media.play().await.unwrap();
        core_async::sleep(Duration::from_secs(4)).await;
        assert!(close_to(media.position(), 4.0));

        media.pause().await.unwrap();
        core_async::sleep(Duration::from_secs(4)).await;
        assert!(close_to(media.position(), 4.0));
    }

    #[core_async::test(start_paused = true)]
    async fn test_rate_change_applies_from_now() {
        let media = VirtualClockMedia::new(100.0);
        media.play().await.unwrap();
        core_async::sleep(Duration::from_secs(2)).await;
        media.set_rate(2.0);
        core_async::sleep(Duration::from_secs(3)).await;
        assert!(close_to(media.position(), 8.0));
    }

    #[core_async::test(start_paused = true)]
    async fn test_seek_and_end_clamp() {
        let media = VirtualClockMedia::new(10.0);
        media.seek(25.0).await.unwrap();
        assert_eq!(media.position(), 10.0);
        assert!(media.is_ended());

        media.seek(-1.0).await.unwrap();
        assert_eq!(media.position(), 0.0);

        media.seek(9.0).await.unwrap();
        media.play().await.unwrap();
        core_async::sleep(Duration::from_secs(5)).await;
        assert_eq!(media.position(), 10.0);
    }

    #[core_async::test(start_paused = true)]
    async fn test_attached_media_buffers_fragment_under_cursor() {
        let loader = Arc::new(CountingLoader::default());
        let client = StreamingClient::new(loader.clone(), loader.clone());
        let media = VirtualClockMedia::attached(client, &manifest());
        assert_eq!(media.duration(), 15.0);

        media.play().await.unwrap();
        media.seek(4.0).await.unwrap();
        media.seek(10.0).await.unwrap();
        media.seek(15.0).await.unwrap();

        assert_eq!(
            *loader.urls.lock(),
            vec!["https://cdn/0.ts".to_string(), "https://cdn/1.ts".to_string()]
        );
    }
}
