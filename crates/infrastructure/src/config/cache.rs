//! Response cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use application::error::ApplicationError;
use serde::{Deserialize, Serialize};

use super::default_true;

/// Settings for the two-tier response cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum number of entries in the in-memory tier (default: 1000)
    #[serde(default = "default_memory_max_entries")]
    pub memory_max_entries: usize,

    /// Lifetime of a cached response in seconds (default: 24 hours)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Whether the persistent tier is used
    #[serde(default = "default_true")]
    pub disk_enabled: bool,

    /// Location of the persistent cache file
    #[serde(default = "default_disk_path")]
    pub disk_path: PathBuf,

    /// Soft ceiling on the persistent tier in bytes (0 = unlimited, default: 100 MiB)
    #[serde(default = "default_disk_max_bytes")]
    pub disk_max_bytes: u64,

    /// Seconds between background saves of the persistent tier (default: 5 minutes)
    #[serde(default = "default_auto_save_interval_secs")]
    pub auto_save_interval_secs: u64,
}

const fn default_memory_max_entries() -> usize {
    1000
}

const fn default_ttl_secs() -> u64 {
    24 * 60 * 60 // 24 hours
}

fn default_disk_path() -> PathBuf {
    PathBuf::from("cache/llm_responses.json")
}

const fn default_disk_max_bytes() -> u64 {
    100 * 1024 * 1024 // 100 MiB
}

const fn default_auto_save_interval_secs() -> u64 {
    5 * 60 // 5 minutes
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_max_entries: default_memory_max_entries(),
            ttl_secs: default_ttl_secs(),
            disk_enabled: true,
            disk_path: default_disk_path(),
            disk_max_bytes: default_disk_max_bytes(),
            auto_save_interval_secs: default_auto_save_interval_secs(),
        }
    }
}

impl CacheConfig {
    /// Get the entry lifetime as a Duration
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get the auto-save interval as a Duration
    #[must_use]
    pub const fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }

    /// Reject settings the cache cannot run with
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.memory_max_entries == 0 {
            return Err(ApplicationError::Configuration(
                "cache.memory_max_entries must be greater than 0".to_string(),
            ));
        }
        if self.ttl_secs == 0 {
            return Err(ApplicationError::Configuration(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.disk_enabled && self.auto_save_interval_secs == 0 {
            return Err(ApplicationError::Configuration(
                "cache.auto_save_interval_secs must be greater than 0 when the disk tier is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
