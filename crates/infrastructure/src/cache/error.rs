//! Cache subsystem errors

use std::path::PathBuf;

use application::error::ApplicationError;
use thiserror::Error;

/// Errors raised by the cache tiers and key codec
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the backing file failed
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Atomic replacement of the backing file failed
    #[error("Failed to persist cache file {path}: {source}")]
    Persist {
        /// Target path of the rename
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The cache document could not be (de)serialized
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A single entry exceeds the tier's byte ceiling
    #[error("Cache entry of {size} bytes exceeds the {max} byte limit")]
    EntryTooLarge {
        /// Serialized size of the entry
        size: u64,
        /// Configured ceiling
        max: u64,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<CacheError> for ApplicationError {
    fn from(err: CacheError) -> Self {
        ApplicationError::Cache(err.to_string())
    }
}
