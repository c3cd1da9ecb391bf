//! # Media Resource Abstractions
//!
//! The engine drives exactly one media resource at a time through
//! [`MediaResource`]; hosts provide the concrete output by implementing
//! [`MediaFactory`]. Position is one continuous timeline in seconds from the
//! start of the book, so the engine needs no per-fragment bookkeeping.
//!
//! The crate ships [`VirtualClockMedia`](crate::headless::VirtualClockMedia),
//! a clock-driven resource for hosts without audio output and for tests.

use crate::error::Result;
use crate::manifest::Manifest;
use crate::streaming::StreamingClient;
use async_trait::async_trait;
use std::sync::Arc;

/// What a media resource is attached to.
#[derive(Clone)]
pub struct MediaSource {
    pub book_id: String,
    pub manifest: Arc<Manifest>,
    /// Fragment access for resources that pull audio data themselves.
    pub client: StreamingClient,
}

/// A playing (or pausable) media element.
#[async_trait]
pub trait MediaResource: Send + Sync {
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    /// Move the clock to an absolute position, clamped to the media.
    async fn seek(&self, position_seconds: f64) -> Result<()>;

    /// Takes effect immediately, including while playing.
    fn set_rate(&self, rate: f64);

    /// Current position of the media clock in seconds.
    fn position(&self) -> f64;

    fn duration(&self) -> f64;

    /// Whether the clock reached the end of the media.
    fn is_ended(&self) -> bool {
        let duration = self.duration();
        duration > 0.0 && self.position() >= duration
    }

    /// Release output resources. The engine calls this before dropping.
    async fn close(&self) {}
}

/// Creates media resources for attached manifests.
#[async_trait]
pub trait MediaFactory: Send + Sync {
    async fn attach(&self, source: MediaSource) -> Result<Box<dyn MediaResource>>;
}
