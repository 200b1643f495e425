//! In-memory LRU tier
//!
//! Bounded, thread-safe cache for the hot path. Capacity is counted in
//! entries; inserting a new key into a full tier evicts exactly the least
//! recently used entry. Expired entries are dropped lazily on read or in bulk
//! by [`MemoryTier::cleanup_expired`]. Nothing here is ever persisted.

use std::num::NonZeroUsize;

use application::ports::CacheStats;
use chrono::Utc;
use domain::{CacheEntry, CacheKey};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, instrument};

/// Default number of entries held in memory
pub const DEFAULT_MEMORY_MAX_ENTRIES: usize = 1000;

struct MemoryState {
    lru: LruCache<CacheKey, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    total_bytes: u64,
}

impl MemoryState {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let removed = self.lru.pop(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry_bytes(&removed));
        Some(removed)
    }
}

/// Size-bounded LRU cache tier
pub struct MemoryTier {
    state: Mutex<MemoryState>,
}

impl std::fmt::Debug for MemoryTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTier")
            .field("entries", &state.lru.len())
            .field("max_size", &state.lru.cap())
            .field("hits", &state.hits)
            .field("misses", &state.misses)
            .field("evictions", &state.evictions)
            .finish()
    }
}

impl MemoryTier {
    /// Create a tier holding at most `max_size` entries
    ///
    /// A `max_size` of zero is clamped to one.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(MemoryState {
                lru: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
                total_bytes: 0,
            }),
        }
    }

    /// Look up an entry, marking it most recently used on a hit
    ///
    /// Expired entries are removed and reported as a miss.
    #[instrument(skip(self), fields(key = %key.short()), level = "trace")]
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let expired = match state.lru.peek(key) {
            Some(entry) => entry.is_expired_at(Utc::now()),
            None => {
                state.misses += 1;
                return None;
            },
        };

        if expired {
            state.remove(key);
            state.misses += 1;
            debug!(key = %key.short(), layer = "memory", "Cache entry expired, removed");
            return None;
        }

        let entry = state.lru.get_mut(key)?;
        entry.record_access();
        let copy = entry.clone();
        state.hits += 1;
        Some(copy)
    }

    /// Insert or replace an entry and mark it most recently used
    #[instrument(skip(self, entry), fields(key = %key.short()), level = "trace")]
    pub fn put(&self, key: CacheKey, entry: CacheEntry) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let bytes = entry_bytes(&entry);

        if state.lru.contains(&key) {
            if let Some(old) = state.lru.put(key, entry) {
                state.total_bytes = state.total_bytes.saturating_sub(entry_bytes(&old));
            }
            state.total_bytes = state.total_bytes.saturating_add(bytes);
            return;
        }

        let full = state.lru.len() >= state.lru.cap().get();
        if let Some((evicted_key, evicted)) = full.then(|| state.lru.pop_lru()).flatten() {
            state.total_bytes = state.total_bytes.saturating_sub(entry_bytes(&evicted));
            state.evictions += 1;
            debug!(key = %evicted_key.short(), layer = "memory", "Evicting LRU cache entry");
        }

        state.lru.put(key, entry);
        state.total_bytes = state.total_bytes.saturating_add(bytes);
    }

    /// Remove an entry; returns whether it was present
    pub fn delete(&self, key: &CacheKey) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every entry; counters are kept
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.lru.clear();
        state.total_bytes = 0;
    }

    /// Remove every expired entry and return how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Utc::now();

        let expired: Vec<CacheKey> = state
            .lru
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        state.evictions += expired.len() as u64;

        if !expired.is_empty() {
            debug!(removed = expired.len(), layer = "memory", "Cleaned up expired cache entries");
        }
        expired.len()
    }

    /// Whether the key is cached, without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().lru.contains(key)
    }

    /// Current number of entries
    pub fn size(&self) -> usize {
        self.state.lock().lru.len()
    }

    /// Maximum number of entries
    pub fn max_size(&self) -> usize {
        self.state.lock().lru.cap().get()
    }

    /// Snapshot of the tier's counters
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            size: state.lru.len(),
            max_size: state.lru.cap().get(),
            total_size_bytes: state.total_bytes,
        }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_MAX_ENTRIES)
    }
}

fn entry_bytes(entry: &CacheEntry) -> u64 {
    entry.approximate_size() as u64
}
