//! Response cache building blocks
//!
//! - `key`: deterministic SHA-256 cache keys derived from a request fingerprint
//! - `MemoryTier`: bounded LRU cache for the hot path
//! - `DiskTier`: single-file JSON store with atomic saves, corruption recovery
//!   and per-entry checksums
//!
//! The tiers are composed by
//! [`CachedCompletionAdapter`](crate::adapters::CachedCompletionAdapter).

mod disk_tier;
mod error;
pub mod integrity;
pub mod key;
mod memory_tier;

pub use disk_tier::{
    DEFAULT_DISK_MAX_BYTES, DISK_FORMAT_VERSION, DiskCounters, DiskStats, DiskTier, LoadReport,
};
pub use error::CacheError;
pub use key::{CacheKeyError, generate_cache_key};
pub use memory_tier::{DEFAULT_MEMORY_MAX_ENTRIES, MemoryTier};
