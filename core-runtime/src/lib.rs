//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the narration core:
//! - Logging and tracing setup
//! - Configuration and capability validation
//! - Event bus
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions
//! and for the [`EventBus`](events::EventBus) through which playback, cache
//! and download progress reach the host.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
