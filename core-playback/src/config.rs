//! # Playback Configuration
//!
//! Configuration types for the playback engine, the resilient file loader and
//! the download orchestrator.

use bridge_traits::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// How often the observable position is refreshed from the media clock
    /// while playing. UI-facing only, never persisted.
    ///
    /// Default: 1 second.
    #[serde(default = "default_position_refresh_interval")]
    pub position_refresh_interval: Duration,

    /// How often position and rate are written to the progress store while
    /// playing.
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_progress_flush_interval")]
    pub progress_flush_interval: Duration,

    /// Default: 0.5.
    #[serde(default = "default_min_rate")]
    pub min_rate: f64,

    /// Default: 2.0.
    #[serde(default = "default_max_rate")]
    pub max_rate: f64,

    /// Step used by `seek_forward` / `seek_backward` (OS media keys).
    ///
    /// Default: 5 seconds.
    #[serde(default = "default_seek_step")]
    pub seek_step: Duration,

    /// Offset added past a section boundary when navigating, so the landing
    /// point resolves to the section after the boundary.
    ///
    /// Default: 50 ms.
    #[serde(default = "default_boundary_epsilon")]
    pub boundary_epsilon: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            position_refresh_interval: default_position_refresh_interval(),
            progress_flush_interval: default_progress_flush_interval(),
            min_rate: default_min_rate(),
            max_rate: default_max_rate(),
            seek_step: default_seek_step(),
            boundary_epsilon: default_boundary_epsilon(),
        }
    }
}

impl PlaybackConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.position_refresh_interval.is_zero() {
            return Err("position_refresh_interval must be > 0".to_string());
        }
        if self.progress_flush_interval.is_zero() {
            return Err("progress_flush_interval must be > 0".to_string());
        }
        if !(self.min_rate > 0.0 && self.min_rate <= self.max_rate) {
            return Err("min_rate must be > 0 and <= max_rate".to_string());
        }
        if !self.max_rate.is_finite() {
            return Err("max_rate must be finite".to_string());
        }
        Ok(())
    }

    /// Clamp `rate` into the configured range.
    pub fn clamp_rate(&self, rate: f64) -> f64 {
        if rate.is_nan() {
            return 1.0_f64.clamp(self.min_rate, self.max_rate);
        }
        rate.clamp(self.min_rate, self.max_rate)
    }
}

/// Retry budget of the resilient file loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRetryConfig {
    /// Retries after the first failed attempt.
    ///
    /// Default: 30.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry; doubles on each following one.
    ///
    /// Default: 1 second.
    #[serde(default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Default: 30 seconds.
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,

    /// Relative jitter applied to each delay, `0.2` meaning ±20%.
    ///
    /// Default: 0.2.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for FileRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl FileRetryConfig {
    /// No retries at all; the first failure is terminal.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay > self.max_delay {
            return Err("initial_delay cannot exceed max_delay".to_string());
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err("jitter must be in [0.0, 1.0)".to_string());
        }
        Ok(())
    }

    /// The equivalent host retry policy. `max_attempts` counts the first
    /// attempt too.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            base_delay: self.initial_delay,
            max_delay: self.max_delay,
            use_exponential_backoff: true,
            jitter: self.jitter,
        }
    }
}

/// Download orchestrator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Simultaneous fragment fetches.
    ///
    /// Default: 5.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Minimum spacing between status record updates while downloading.
    ///
    /// Default: 250 ms.
    #[serde(default = "default_progress_sample_interval")]
    pub progress_sample_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            progress_sample_interval: default_progress_sample_interval(),
        }
    }
}

impl DownloadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be > 0".to_string());
        }
        if self.progress_sample_interval.is_zero() {
            return Err("progress_sample_interval must be > 0".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_position_refresh_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_min_rate() -> f64 {
    0.5
}

fn default_max_rate() -> f64 {
    2.0
}

fn default_seek_step() -> Duration {
    Duration::from_secs(5)
}

fn default_boundary_epsilon() -> Duration {
    Duration::from_millis(50)
}

fn default_max_retries() -> u32 {
    30
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter() -> f64 {
    0.2
}

fn default_concurrency() -> usize {
    5
}

fn default_progress_sample_interval() -> Duration {
    Duration::from_millis(250)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs_are_valid() {
        assert!(PlaybackConfig::default().validate().is_ok());
        assert!(FileRetryConfig::default().validate().is_ok());
        assert!(DownloadConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rate_clamp() {
        let config = PlaybackConfig::default();
        assert_eq!(config.clamp_rate(3.0), 2.0);
        assert_eq!(config.clamp_rate(0.1), 0.5);
        assert_eq!(config.clamp_rate(1.25), 1.25);
        assert_eq!(config.clamp_rate(f64::NAN), 1.0);
    }

    #[test]
    fn test_playback_config_validation() {
        let mut config = PlaybackConfig::default();
        config.min_rate = 3.0;
        assert!(config.validate().is_err());

        let mut config = PlaybackConfig::default();
        config.progress_flush_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_retry_schedule() {
        let policy = FileRetryConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 31);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: DownloadConfig = serde_json::from_str(r#"{"concurrency": 2}"#).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.progress_sample_interval, Duration::from_millis(250));
    }
}
