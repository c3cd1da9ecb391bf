//! # Playback Engine
//!
//! Owns the single active media resource of a session and everything derived
//! from it: global progress, the current section and the playback rate.
//!
//! ## State cells
//!
//! Every piece of observable state lives in a `watch` cell. Subscribers get
//! the current value immediately and every later change; the section cell
//! only notifies when the section actually changes.
//!
//! ## Ordering
//!
//! Transport operations take the session lock for their whole duration, so a
//! `play` that attaches a fresh media resource settles before a following
//! `seek` reads its clock. The timeline is swapped as a whole behind an
//! `Arc`; readers keep whatever snapshot they cloned.
//!
//! ## Cadences
//!
//! Two background tasks run only while playing:
//! - position refresh (1 s): copies the media clock into the observable
//!   progress and notices the end of the book
//! - progress flush (5 s): hands a [`PlaybackPosition`] to the
//!   [`ProgressSink`]
//!
//! Both stop when the engine is destroyed or dropped.

use crate::books::BookUrls;
use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, Result};
use crate::manifest::Manifest;
use crate::models::{BookDetails, PlaybackPosition, PlaybackStatus, ProgressRecord};
use crate::progress::ProgressSink;
use crate::streaming::StreamingClient;
use crate::timeline::SectionTimeline;
use crate::traits::{MediaFactory, MediaResource, MediaSource};
use core_async::sync::{watch, CancellationToken, DropGuard, Mutex};
use core_async::time::{interval_at, Duration, Instant, MissedTickBehavior};
use core_runtime::events::{CoreEvent, EventBus, PlaybackEvent};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, instrument, warn};

const UNABLE_TO_PLAY: &str = "Unable to play this book";

struct Session {
    book_id: Option<String>,
    manifest: Option<Arc<Manifest>>,
    media: Option<Box<dyn MediaResource>>,
    /// Where a media resource attached later should start.
    resume_at: f64,
}

impl Session {
    fn position(&self) -> f64 {
        self.media
            .as_ref()
            .map_or(self.resume_at, |media| media.position())
    }

    fn duration(&self) -> f64 {
        match (&self.media, &self.manifest) {
            (Some(media), _) => media.duration(),
            (None, Some(manifest)) => manifest.total_duration(),
            (None, None) => 0.0,
        }
    }

    async fn teardown(&mut self) {
        if let Some(media) = self.media.take() {
            media.close().await;
        }
    }
}

struct EngineInner {
    config: PlaybackConfig,
    client: StreamingClient,
    media_factory: Arc<dyn MediaFactory>,
    progress: Arc<dyn ProgressSink>,
    urls: BookUrls,
    event_bus: Option<EventBus>,
    session: Mutex<Session>,
    timeline: RwLock<Arc<SectionTimeline>>,
    status: watch::Sender<PlaybackStatus>,
    rate: watch::Sender<f64>,
    global_progress: watch::Sender<f64>,
    section_id: watch::Sender<Option<i64>>,
    book: watch::Sender<Option<BookDetails>>,
    shutdown: CancellationToken,
}

impl EngineInner {
    fn emit(&self, event: PlaybackEvent) {
        if let Some(bus) = &self.event_bus {
            let _ = bus.emit(CoreEvent::Playback(event));
        }
    }

    fn timeline(&self) -> Arc<SectionTimeline> {
        self.timeline.read().clone()
    }

    /// Publish `t` as the global position and recompute the section.
    fn publish_position(&self, book_id: Option<&str>, t: f64) {
        self.global_progress.send_replace(t);

        let timeline = self.timeline();
        let section_id = timeline
            .lookup(t)
            .map(|index| timeline.entries()[index].section_id);
        let changed = self.section_id.send_if_modified(|current| {
            if *current == section_id {
                false
            } else {
                *current = section_id;
                true
            }
        });
        if changed {
            debug!(?section_id, "Section changed");
            self.emit(PlaybackEvent::SectionChanged {
                book_id: book_id.unwrap_or_default().to_string(),
                section_id,
            });
        }
    }

    fn set_status(&self, status: PlaybackStatus) {
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    async fn seek_locked(&self, session: &mut Session, target: f64) -> Result<f64> {
        if session.manifest.is_none() {
            return Err(PlaybackError::NoBookLoaded);
        }
        let target = if target.is_finite() { target } else { 0.0 };
        let target = target.clamp(0.0, session.duration());
        if let Some(media) = &session.media {
            media.seek(target).await?;
        }
        session.resume_at = target;
        self.publish_position(session.book_id.as_deref(), target);
        Ok(target)
    }

    async fn refresh_position(&self) {
        let mut session = self.session.lock().await;
        let Some(media) = &session.media else {
            return;
        };
        let position = media.position();
        let ended = media.is_ended();
        if ended {
            if let Err(e) = media.pause().await {
                warn!(error = %e, "Failed to pause media at end of book");
            }
        }
        session.resume_at = position;
        self.publish_position(session.book_id.as_deref(), position);

        if ended && self.status.borrow().is_playing() {
            info!(position, "Reached end of book");
            self.set_status(PlaybackStatus::Paused);
            self.emit(PlaybackEvent::Paused {
                book_id: session.book_id.clone().unwrap_or_default(),
                position_seconds: position,
            });
        }
    }

    async fn flush_progress(&self) {
        let position = {
            let mut session = self.session.lock().await;
            let Some(book_id) = session.book_id.clone() else {
                return;
            };
            let t = session.position();
            session.resume_at = t;
            self.publish_position(Some(&book_id), t);
            PlaybackPosition {
                book_id,
                section_id: *self.section_id.borrow(),
                section_progress_seconds: self.timeline().section_progress(t),
                global_progress_seconds: t,
                playback_rate: *self.rate.borrow(),
            }
        };

        let Some(section_id) = position.section_id else {
            debug!("No active section; skipping progress flush");
            return;
        };

        let outcome = self.progress.save_progress(&position).await;
        debug!(?outcome, section_id, "Progress flushed");
        self.emit(PlaybackEvent::ProgressSaved {
            book_id: position.book_id,
            section_id,
            section_progress_seconds: position.section_progress_seconds,
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum Cadence {
    RefreshPosition,
    FlushProgress,
}

async fn run_cadence(
    inner: Weak<EngineInner>,
    mut status: watch::Receiver<PlaybackStatus>,
    cadence: Cadence,
    period: Duration,
    shutdown: CancellationToken,
) {
    'outer: loop {
        while !status.borrow_and_update().is_playing() {
            core_async::select! {
                biased;
                _ = shutdown.cancelled() => break 'outer,
                changed = status.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                }
            }
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            core_async::select! {
                biased;
                _ = shutdown.cancelled() => break 'outer,
                changed = status.changed() => {
                    if changed.is_err() {
                        break 'outer;
                    }
                    if !status.borrow_and_update().is_playing() {
                        continue 'outer;
                    }
                }
                _ = ticker.tick() => {
                    let Some(inner) = inner.upgrade() else {
                        break 'outer;
                    };
                    match cadence {
                        Cadence::RefreshPosition => inner.refresh_position().await,
                        Cadence::FlushProgress => inner.flush_progress().await,
                    }
                }
            }
        }
    }
    debug!(?cadence, "Cadence stopped");
}

/// Drives playback of one book at a time.
///
/// # Example
///
/// ```ignore
/// let engine = PlaybackEngine::builder(client, Arc::new(HeadlessMediaFactory), progress, urls)
///     .build()?;
/// engine.set_book_details(book).await?;
/// engine.play().await?;
/// ```
pub struct PlaybackEngine {
    inner: Arc<EngineInner>,
    _cadences: DropGuard,
}

impl PlaybackEngine {
    pub fn builder(
        client: StreamingClient,
        media_factory: Arc<dyn MediaFactory>,
        progress: Arc<dyn ProgressSink>,
        urls: BookUrls,
    ) -> PlaybackEngineBuilder {
        PlaybackEngineBuilder {
            client,
            media_factory,
            progress,
            urls,
            config: PlaybackConfig::default(),
            event_bus: None,
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.inner.config
    }

    // ========================================================================
    // Book lifecycle
    // ========================================================================

    /// Switch to `book`: drop the current media, reset timeline and progress,
    /// then attach the book's manifest.
    ///
    /// A manifest that cannot be attached is reported once (as an error event
    /// and as [`PlaybackError::StreamUnavailable`]) and leaves the engine
    /// inert; there is no automatic retry.
    #[instrument(skip(self, book), fields(book_id = %book.id))]
    pub async fn set_book_details(&self, book: BookDetails) -> Result<()> {
        let inner = &self.inner;
        self.ensure_alive()?;

        let mut session = inner.session.lock().await;
        session.teardown().await;
        session.book_id = Some(book.id.clone());
        session.manifest = None;
        session.resume_at = 0.0;
        *inner.timeline.write() = Arc::new(SectionTimeline::empty());
        inner.set_status(PlaybackStatus::Stopped);
        inner.publish_position(Some(&book.id), 0.0);

        let book_id = book.id.clone();
        inner.book.send_replace(Some(book));

        let url = inner.urls.manifest(&book_id)?;
        let manifest = match inner.client.attach(&url, &inner.shutdown).await {
            Ok(manifest) => manifest,
            Err(source) => {
                error!(error = %source, "Failed to attach manifest");
                inner.emit(PlaybackEvent::Error {
                    book_id: Some(book_id.clone()),
                    message: UNABLE_TO_PLAY.to_string(),
                    recoverable: false,
                });
                return Err(PlaybackError::StreamUnavailable { book_id, source });
            }
        };

        let timeline = Arc::new(SectionTimeline::build(manifest.sections.iter().cloned()));
        let duration_seconds = manifest.total_duration();
        *inner.timeline.write() = timeline.clone();
        session.manifest = Some(Arc::new(manifest));

        info!(
            sections = timeline.sections().len(),
            duration_seconds, "Book ready for playback"
        );
        inner.emit(PlaybackEvent::BookLoaded {
            book_id: book_id.clone(),
            section_count: timeline.sections().len(),
            duration_seconds,
        });
        if timeline.is_empty() {
            warn!("Manifest carries no section metadata; section navigation disabled");
            inner.emit(PlaybackEvent::TimelineMissing { book_id });
        }
        Ok(())
    }

    /// Apply a persisted progress record as the resume point.
    ///
    /// Works before the first `play`: the rate and position are handed to the
    /// media resource when it attaches, ahead of any playback.
    #[instrument(skip(self, record), fields(book_id = %record.book_id))]
    pub async fn set_playback_progress(&self, record: &ProgressRecord) -> Result<()> {
        self.ensure_alive()?;
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        if !record.book_id.is_empty() && session.book_id.as_deref() != Some(&record.book_id) {
            return Err(PlaybackError::InvalidState(format!(
                "progress for {} does not belong to the loaded book",
                record.book_id
            )));
        }

        if let Some(rate) = record.playback_rate {
            let rate = inner.config.clamp_rate(rate);
            inner.rate.send_replace(rate);
            if let Some(media) = &session.media {
                media.set_rate(rate);
            }
        }
        let target = inner
            .seek_locked(&mut session, record.global_progress_seconds)
            .await?;
        debug!(target, "Resume point applied");
        Ok(())
    }

    /// Stop both cadences and discard the media resource. The engine
    /// rejects further transport operations afterwards.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        inner.shutdown.cancel();
        let mut session = inner.session.lock().await;
        session.teardown().await;
        inner.set_status(PlaybackStatus::Stopped);
        info!("Playback engine destroyed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(PlaybackError::InvalidState(
                "playback engine was destroyed".to_string(),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Transport
    // ========================================================================

    #[instrument(skip(self))]
    pub async fn play(&self) -> Result<()> {
        self.ensure_alive()?;
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        let Some(manifest) = session.manifest.clone() else {
            return Err(PlaybackError::NoBookLoaded);
        };
        let book_id = session.book_id.clone().unwrap_or_default();

        if session.media.is_none() {
            let media = inner
                .media_factory
                .attach(MediaSource {
                    book_id: book_id.clone(),
                    manifest,
                    client: inner.client.clone(),
                })
                .await?;
            media.set_rate(*inner.rate.borrow());
            media.seek(session.resume_at).await?;
            session.media = Some(media);
        }

        let Some(media) = &session.media else {
            return Err(PlaybackError::InvalidState("media detached".to_string()));
        };
        media.play().await?;
        let position = media.position();
        inner.publish_position(Some(&book_id), position);
        inner.set_status(PlaybackStatus::Playing);
        inner.emit(PlaybackEvent::Started {
            book_id,
            position_seconds: position,
        });
        Ok(())
    }

    /// Pause, reading the media clock first so the paused position is exact.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> Result<()> {
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        if session.manifest.is_none() {
            return Err(PlaybackError::NoBookLoaded);
        }
        let Some(media) = &session.media else {
            return Ok(());
        };
        let position = media.position();
        media.pause().await?;
        session.resume_at = position;
        inner.publish_position(session.book_id.as_deref(), position);

        if inner.status.borrow().is_playing() {
            inner.set_status(PlaybackStatus::Paused);
            inner.emit(PlaybackEvent::Paused {
                book_id: session.book_id.clone().unwrap_or_default(),
                position_seconds: position,
            });
        }
        Ok(())
    }

    /// Move the play cursor by `adjustment_seconds` (negative rewinds).
    pub async fn seek(&self, adjustment_seconds: f64) -> Result<f64> {
        self.ensure_alive()?;
        let mut session = self.inner.session.lock().await;
        let target = session.position() + adjustment_seconds;
        self.inner.seek_locked(&mut session, target).await
    }

    /// Move the play cursor to `position_seconds`, clamped to the book.
    pub async fn seek_to(&self, position_seconds: f64) -> Result<f64> {
        self.ensure_alive()?;
        let mut session = self.inner.session.lock().await;
        self.inner.seek_locked(&mut session, position_seconds).await
    }

    pub async fn seek_forward(&self) -> Result<f64> {
        self.seek(self.inner.config.seek_step.as_secs_f64()).await
    }

    pub async fn seek_backward(&self) -> Result<f64> {
        self.seek(-self.inner.config.seek_step.as_secs_f64()).await
    }

    /// Jump to the start of the next section. Returns the new position, or
    /// `None` when there is nowhere to go (last section, no timeline).
    pub async fn next(&self) -> Result<Option<f64>> {
        self.ensure_alive()?;
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        let epsilon = inner.config.boundary_epsilon.as_secs_f64();
        match inner.timeline().next_target(session.position(), epsilon) {
            Some(target) => Ok(Some(inner.seek_locked(&mut session, target).await?)),
            None => {
                debug!("No next section");
                Ok(None)
            }
        }
    }

    /// Jump just inside the section before the current one.
    pub async fn previous(&self) -> Result<Option<f64>> {
        self.ensure_alive()?;
        let inner = &self.inner;
        let mut session = inner.session.lock().await;
        let epsilon = inner.config.boundary_epsilon.as_secs_f64();
        match inner.timeline().previous_target(session.position(), epsilon) {
            Some(target) => Ok(Some(inner.seek_locked(&mut session, target).await?)),
            None => {
                debug!("No previous section");
                Ok(None)
            }
        }
    }

    /// Change the rate by `delta`, clamped to the configured range. The new
    /// rate reaches the current media immediately and every media resource
    /// attached later.
    pub async fn adjust_playback_rate(&self, delta: f64) -> Result<f64> {
        self.ensure_alive()?;
        let inner = &self.inner;
        let session = inner.session.lock().await;
        let rate = inner.config.clamp_rate(*inner.rate.borrow() + delta);
        let changed = inner.rate.send_if_modified(|current| {
            if *current == rate {
                false
            } else {
                *current = rate;
                true
            }
        });
        if let Some(media) = &session.media {
            media.set_rate(rate);
        }
        if changed {
            debug!(rate, "Playback rate changed");
            inner.emit(PlaybackEvent::RateChanged {
                book_id: session.book_id.clone().unwrap_or_default(),
                rate,
            });
        }
        Ok(rate)
    }

    // ========================================================================
    // Observable state
    // ========================================================================

    pub fn status(&self) -> PlaybackStatus {
        *self.inner.status.borrow()
    }

    pub fn is_playing(&self) -> bool {
        self.status().is_playing()
    }

    pub fn playback_rate(&self) -> f64 {
        *self.inner.rate.borrow()
    }

    pub fn global_progress_seconds(&self) -> f64 {
        *self.inner.global_progress.borrow()
    }

    pub fn section_id(&self) -> Option<i64> {
        *self.inner.section_id.borrow()
    }

    /// Seconds into the current section.
    pub fn section_progress_seconds(&self) -> f64 {
        self.inner
            .timeline()
            .section_progress(self.global_progress_seconds())
    }

    pub fn book_details(&self) -> Option<BookDetails> {
        self.inner.book.borrow().clone()
    }

    pub fn timeline(&self) -> Arc<SectionTimeline> {
        self.inner.timeline()
    }

    /// Snapshot of the position as it would be persisted.
    pub fn position(&self) -> Option<PlaybackPosition> {
        let book_id = self.inner.book.borrow().as_ref()?.id.clone();
        Some(PlaybackPosition {
            book_id,
            section_id: self.section_id(),
            section_progress_seconds: self.section_progress_seconds(),
            global_progress_seconds: self.global_progress_seconds(),
            playback_rate: self.playback_rate(),
        })
    }

    pub fn watch_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.inner.status.subscribe()
    }

    pub fn watch_playback_rate(&self) -> watch::Receiver<f64> {
        self.inner.rate.subscribe()
    }

    pub fn watch_global_progress(&self) -> watch::Receiver<f64> {
        self.inner.global_progress.subscribe()
    }

    /// Notified only when the section changes, not on every position update.
    pub fn watch_section_id(&self) -> watch::Receiver<Option<i64>> {
        self.inner.section_id.subscribe()
    }

    pub fn watch_book_details(&self) -> watch::Receiver<Option<BookDetails>> {
        self.inner.book.subscribe()
    }
}

/// Builder for [`PlaybackEngine`]
pub struct PlaybackEngineBuilder {
    client: StreamingClient,
    media_factory: Arc<dyn MediaFactory>,
    progress: Arc<dyn ProgressSink>,
    urls: BookUrls,
    config: PlaybackConfig,
    event_bus: Option<EventBus>,
}

impl PlaybackEngineBuilder {
    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Build the engine and spawn its cadences; must run inside a runtime.
    pub fn build(self) -> Result<PlaybackEngine> {
        self.config.validate().map_err(PlaybackError::Config)?;

        let shutdown = CancellationToken::new();
        let inner = Arc::new(EngineInner {
            client: self.client,
            media_factory: self.media_factory,
            progress: self.progress,
            urls: self.urls,
            event_bus: self.event_bus,
            session: Mutex::new(Session {
                book_id: None,
                manifest: None,
                media: None,
                resume_at: 0.0,
            }),
            timeline: RwLock::new(Arc::new(SectionTimeline::empty())),
            status: watch::Sender::new(PlaybackStatus::Stopped),
            rate: watch::Sender::new(self.config.clamp_rate(1.0)),
            global_progress: watch::Sender::new(0.0),
            section_id: watch::Sender::new(None),
            book: watch::Sender::new(None),
            shutdown: shutdown.clone(),
            config: self.config,
        });

        for (cadence, period) in [
            (
                Cadence::RefreshPosition,
                inner.config.position_refresh_interval,
            ),
            (Cadence::FlushProgress, inner.config.progress_flush_interval),
        ] {
            core_async::spawn(run_cadence(
                Arc::downgrade(&inner),
                inner.status.subscribe(),
                cadence,
                period,
                shutdown.clone(),
            ));
        }

        Ok(PlaybackEngine {
            inner,
            _cadences: shutdown.drop_guard(),
        })
    }
}
