//! Application layer - Ports and errors
//!
//! Defines the completion port that caching decorators wrap and the
//! statistics surface they expose. Infrastructure adapters implement these.

pub mod error;
pub mod ports;

pub use error::ApplicationError;
pub use ports::*;
