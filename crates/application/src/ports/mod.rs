//! Port definitions for application layer
//!
//! Ports are interfaces that define how the application interacts with
//! external systems. Adapters in the infrastructure layer implement these ports.

mod cache_port;
mod completion_port;

pub use cache_port::{CacheStats, CleanupReport, ResponseCachePort};
#[cfg(test)]
pub use completion_port::MockCompletionPort;
pub use completion_port::CompletionPort;
