//! Application configuration
//!
//! Sources, lowest precedence first:
//! - built-in defaults (every field has one)
//! - optional `config.{toml,json,yaml}` in the working directory
//! - `LLMCACHE_*` environment variables, `__` between nesting levels
//!   (e.g. `LLMCACHE_CACHE__TTL_SECS=3600`)

mod cache;

use serde::{Deserialize, Serialize};

pub use cache::CacheConfig;

use crate::telemetry::LoggingConfig;

/// Shared default for boolean `true` fields across config structs
pub(crate) const fn default_true() -> bool {
    true
}

/// Environment variable prefix
pub const ENV_PREFIX: &str = "LLMCACHE";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and optional `config` file
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration using `file_stem` as the optional file source
    ///
    /// The extension is resolved by the `config` crate.
    pub fn load_from(file_stem: &str) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file_stem).required(false))
            // Override with environment variables (e.g., LLMCACHE_CACHE__ENABLED)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
