//! Domain-level errors

use thiserror::Error;

/// Errors that can occur in the domain layer
#[derive(Debug, Error)]
pub enum DomainError {
    /// A cache key was not a 64-character lowercase hex digest
    #[error("Invalid cache key: {0}")]
    InvalidCacheKey(String),

    /// Validation failed
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

impl DomainError {
    /// Create an invalid cache key error, truncating long input for display
    pub fn invalid_cache_key(raw: &str) -> Self {
        let shown: String = raw.chars().take(16).collect();
        if raw.chars().count() > 16 {
            Self::InvalidCacheKey(format!("{shown}..."))
        } else {
            Self::InvalidCacheKey(shown)
        }
    }
}
