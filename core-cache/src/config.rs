//! # Cache Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by the offline-aware caches and the caching loaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Failed remote writes tolerated per pending entry before it is
    /// dead-lettered (kept locally, no longer replayed).
    ///
    /// Default: 5.
    #[serde(default = "default_max_sync_attempts")]
    pub max_sync_attempts: u32,

    /// Age after which a cached manifest is revalidated while online.
    /// `None` serves cached manifests forever.
    ///
    /// Default: 15 minutes.
    #[serde(default = "default_manifest_max_age")]
    pub manifest_max_age: Option<Duration>,

    /// Same for fragments and files. Their content is immutable per URL.
    ///
    /// Default: `None`.
    #[serde(default)]
    pub fragment_max_age: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_sync_attempts: default_max_sync_attempts(),
            manifest_max_age: default_manifest_max_age(),
            fragment_max_age: None,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_sync_attempts == 0 {
            return Err("max_sync_attempts must be > 0".to_string());
        }
        if self.manifest_max_age == Some(Duration::ZERO) {
            return Err("manifest_max_age must be > 0 when set".to_string());
        }
        if self.fragment_max_age == Some(Duration::ZERO) {
            return Err("fragment_max_age must be > 0 when set".to_string());
        }
        Ok(())
    }
}

fn default_max_sync_attempts() -> u32 {
    5
}

fn default_manifest_max_age() -> Option<Duration> {
    Some(Duration::from_secs(15 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_sync_attempts, 5);
        assert_eq!(config.manifest_max_age, Some(Duration::from_secs(900)));
        assert_eq!(config.fragment_max_age, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: CacheConfig = serde_json::from_str(r#"{"max_sync_attempts": 2}"#).unwrap();
        assert_eq!(config.max_sync_attempts, 2);
        assert_eq!(config.manifest_max_age, Some(Duration::from_secs(900)));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = CacheConfig {
            max_sync_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
