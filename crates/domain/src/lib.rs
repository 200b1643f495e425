//! Domain layer for the LLM response cache
//!
//! Contains the completion request/response shapes, the request fingerprint
//! and cache key value objects, and the cache entry entity shared by every
//! cache tier. This layer performs no I/O.

pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::*;
pub use errors::DomainError;
pub use value_objects::*;
