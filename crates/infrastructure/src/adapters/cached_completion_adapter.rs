//! Cached completion adapter - Decorator that adds caching to any `CompletionPort`
//!
//! Lookups go to the in-memory tier first, then the optional disk tier
//! (promoting disk hits into memory), and only then to the wrapped client.
//! Successful responses are written through to both tiers. Every internal
//! cache failure degrades to calling the wrapped client; errors from the
//! client itself are returned unchanged and never cached.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use application::{
    error::ApplicationError,
    ports::{CacheStats, CleanupReport, CompletionPort, ResponseCachePort},
};
use async_trait::async_trait;
use domain::{CacheEntry, CompletionRequest, CompletionResponse};
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{DiskStats, DiskTier, MemoryTier, generate_cache_key},
    config::CacheConfig,
};

/// Statistics of the adapter and each of its tiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Request-level hits and misses, evictions summed over both tiers,
    /// size figures of the memory tier
    pub combined: CacheStats,
    /// Raw memory tier counters
    pub memory: CacheStats,
    /// Raw disk tier counters, when a disk tier is configured
    pub disk: Option<DiskStats>,
}

/// Caching decorator for completion ports
///
/// Exposes the same interface as the wrapped client so callers cannot tell
/// whether caching is in place.
pub struct CachedCompletionAdapter<P: CompletionPort> {
    /// The underlying completion implementation
    inner: P,
    /// Hot in-memory tier
    memory: Arc<MemoryTier>,
    /// Optional persistent tier
    disk: Option<Arc<DiskTier>>,
    /// Lifetime of newly cached responses
    ttl: Duration,
    /// Whether caching is enabled
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<P: CompletionPort + std::fmt::Debug> std::fmt::Debug for CachedCompletionAdapter<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedCompletionAdapter")
            .field("inner", &self.inner)
            .field("memory", &self.memory)
            .field("disk", &self.disk)
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl<P: CompletionPort> CachedCompletionAdapter<P> {
    /// Create a new cached completion adapter
    pub fn new(
        inner: P,
        memory: Arc<MemoryTier>,
        disk: Option<Arc<DiskTier>>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            memory,
            disk,
            ttl,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build both tiers from configuration
    ///
    /// Loads the disk file and starts the auto-save worker when the disk tier
    /// is enabled. Load failures are logged and leave the disk tier empty.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Configuration`] if the configuration fails
    /// validation; no tier is built in that case.
    pub async fn from_config(inner: P, config: &CacheConfig) -> Result<Self, ApplicationError> {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Rejecting invalid cache configuration");
            return Err(e);
        }

        let memory = Arc::new(MemoryTier::new(config.memory_max_entries));

        let disk = if config.enabled && config.disk_enabled {
            let tier = Arc::new(DiskTier::new(
                &config.disk_path,
                config.ttl(),
                config.disk_max_bytes,
            ));
            load_disk_tier(&tier).await;
            tier.start_auto_save(config.auto_save_interval());
            Some(tier)
        } else {
            None
        };

        info!(
            enabled = config.enabled,
            memory_max_entries = config.memory_max_entries,
            disk = disk.is_some(),
            ttl_secs = config.ttl_secs,
            "Response cache configured"
        );

        let adapter = Self::new(inner, memory, disk, config.ttl());
        Ok(if config.enabled {
            adapter
        } else {
            adapter.with_caching_disabled()
        })
    }

    /// Disable caching (useful for debugging)
    #[must_use]
    pub fn with_caching_disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Enable caching
    #[must_use]
    pub fn with_caching_enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Whether responses are being cached
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the underlying completion adapter
    pub const fn inner(&self) -> &P {
        &self.inner
    }

    /// The in-memory tier
    pub const fn memory(&self) -> &Arc<MemoryTier> {
        &self.memory
    }

    /// The persistent tier, if configured
    pub fn disk(&self) -> Option<&Arc<DiskTier>> {
        self.disk.as_ref()
    }

    /// Lifetime given to newly cached responses
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Request-level and per-tier statistics
    pub fn stats(&self) -> OrchestratorStats {
        let memory = self.memory.stats();
        let disk = self.disk.as_ref().map(|d| d.stats());
        let disk_evictions = disk.as_ref().map_or(0, |d| d.cache.evictions);

        let combined = CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: memory.evictions + disk_evictions,
            size: memory.size,
            max_size: memory.max_size,
            total_size_bytes: memory.total_size_bytes,
        };

        OrchestratorStats {
            combined,
            memory,
            disk,
        }
    }

    /// Drop any cached response for this request from both tiers
    ///
    /// Returns whether anything was removed.
    pub fn invalidate(&self, request: &CompletionRequest) -> bool {
        let Ok((key, _)) = generate_cache_key(request) else {
            return false;
        };
        let in_memory = self.memory.delete(&key);
        let on_disk = self.disk.as_ref().is_some_and(|d| d.delete(&key));
        if in_memory || on_disk {
            debug!(key = %key.short(), "Invalidated cached response");
        }
        in_memory || on_disk
    }

    /// Stop background persistence and flush the disk tier
    pub async fn shutdown(&self) -> Result<(), ApplicationError> {
        let Some(disk) = &self.disk else {
            return Ok(());
        };
        if disk.is_auto_save_running() {
            disk.stop().await?;
        } else {
            disk.save()?;
        }
        info!("Response cache shut down");
        Ok(())
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        tracing::Span::current().record("cached", true);
    }
}

async fn load_disk_tier(tier: &Arc<DiskTier>) {
    let loader = Arc::clone(tier);
    match tokio::task::spawn_blocking(move || loader.load()).await {
        Ok(Ok(report)) => {
            if let Some(backup) = report.recovered_from {
                warn!(backup = %backup.display(), "Disk cache was unusable and has been reset");
            }
        },
        Ok(Err(e)) => warn!(error = %e, "Failed to load disk cache, starting empty"),
        Err(e) => warn!(error = %e, "Disk cache load task failed"),
    }
}

#[async_trait]
impl<P: CompletionPort> CompletionPort for CachedCompletionAdapter<P> {
    #[instrument(skip(self, request), fields(cached = tracing::field::Empty))]
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ApplicationError> {
        if !self.enabled {
            return self.inner.complete(request).await;
        }

        let (key, fingerprint) = match generate_cache_key(request) {
            Ok(derived) => derived,
            Err(e) => {
                warn!(error = %e, "Cannot derive cache key, bypassing cache");
                return self.inner.complete(request).await;
            },
        };

        if let Some(entry) = self.memory.get(&key) {
            self.record_hit();
            debug!(key = %key.short(), layer = "memory", "Cache hit");
            return Ok(entry.response);
        }

        if let Some(entry) = self.disk.as_ref().and_then(|d| d.get(&key)) {
            self.record_hit();
            debug!(key = %key.short(), layer = "disk", "Cache hit, promoting to memory");
            let response = entry.response.clone();
            self.memory.put(key, entry);
            return Ok(response);
        }

        tracing::Span::current().record("cached", false);

        let response = self.inner.complete(request).await?;

        self.misses.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(key.clone(), fingerprint, response.clone(), self.ttl);
        self.memory.put(key.clone(), entry.clone());
        if let Some(Err(e)) = self.disk.as_ref().map(|d| d.put(key.clone(), entry)) {
            warn!(key = %key.short(), error = %e, "Failed to store response in disk cache");
        }
        debug!(key = %key.short(), ttl_secs = self.ttl.as_secs(), "Cached completion response");

        Ok(response)
    }

    async fn is_healthy(&self) -> bool {
        self.inner.is_healthy().await
    }

    fn provider_name(&self) -> String {
        format!("{}+cache", self.inner.provider_name())
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    fn supports_streaming(&self) -> bool {
        self.inner.supports_streaming()
    }
}

#[async_trait]
impl<P: CompletionPort> ResponseCachePort for CachedCompletionAdapter<P> {
    fn cache_stats(&self) -> CacheStats {
        self.stats().combined
    }

    async fn cleanup_expired(&self) -> Result<CleanupReport, ApplicationError> {
        let report = CleanupReport {
            memory_removed: self.memory.cleanup_expired(),
            disk_removed: self.disk.as_ref().map_or(0, |d| d.cleanup_expired()),
        };
        if report.total() > 0 {
            info!(
                memory = report.memory_removed,
                disk = report.disk_removed,
                "Removed expired cache entries"
            );
        }
        Ok(report)
    }

    async fn clear(&self) -> Result<(), ApplicationError> {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            let disk = Arc::clone(disk);
            tokio::task::spawn_blocking(move || disk.clear())
                .await
                .map_err(|e| ApplicationError::Internal(format!("Cache clear task failed: {e}")))??;
        }
        info!("Response cache cleared");
        Ok(())
    }
}
