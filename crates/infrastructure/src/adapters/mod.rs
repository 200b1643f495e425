//! Infrastructure adapters
//!
//! Adapters connect application ports to concrete implementations.

mod cached_completion_adapter;

pub use cached_completion_adapter::{CachedCompletionAdapter, OrchestratorStats};
