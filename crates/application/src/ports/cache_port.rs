//! Cache port definition
//!
//! Defines the statistics and maintenance surface a response cache exposes to
//! whatever operational layer wraps it (CLI, health endpoint, metrics).

use async_trait::async_trait;

use crate::error::ApplicationError;

/// Maintenance and observability surface of a response cache
#[async_trait]
pub trait ResponseCachePort: Send + Sync {
    /// Aggregated cache statistics
    fn cache_stats(&self) -> CacheStats;

    /// Remove every expired entry from all tiers
    async fn cleanup_expired(&self) -> Result<CleanupReport, ApplicationError>;

    /// Remove every entry from all tiers
    async fn clear(&self) -> Result<(), ApplicationError>;
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Entries removed by capacity limits or expiry cleanup
    pub evictions: u64,
    /// Current number of entries
    pub size: usize,
    /// Maximum number of entries (0 when unbounded)
    pub max_size: usize,
    /// Approximate total size in bytes
    pub total_size_bytes: u64,
}

impl CacheStats {
    /// Total number of lookups recorded
    #[must_use]
    pub const fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups served from cache, `0.0` before the first lookup
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }
}

/// Number of entries removed by an expiry sweep, per tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Entries removed from the in-memory tier
    pub memory_removed: usize,
    /// Entries removed from the persistent tier
    pub disk_removed: usize,
}

impl CleanupReport {
    /// Entries removed across all tiers
    #[must_use]
    pub const fn total(&self) -> usize {
        self.memory_removed + self.disk_removed
    }
}
