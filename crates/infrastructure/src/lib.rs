//! Infrastructure layer - Adapters for external systems
//!
//! Implements the ports defined in the application layer: the two-tier
//! response cache, its configuration, and logging setup.

pub mod adapters;
pub mod cache;
pub mod config;
pub mod telemetry;

pub use adapters::*;
pub use cache::{
    CacheError, CacheKeyError, DiskStats, DiskTier, LoadReport, MemoryTier, generate_cache_key,
};
pub use config::{AppConfig, CacheConfig};
pub use telemetry::{LoggingConfig, TelemetryError, init_logging};
