//! Logging infrastructure
//!
//! Installs a `tracing-subscriber` pipeline with an `EnvFilter` and either
//! human-readable or JSON output.

mod logging;

pub use logging::{LoggingConfig, TelemetryError, init_logging};
