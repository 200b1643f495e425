//! Value Objects - Immutable, identity-less domain primitives

mod cache_key;
mod request_fingerprint;

pub use cache_key::{CACHE_KEY_LEN, CacheKey};
pub use request_fingerprint::{FingerprintMessage, FingerprintTool, RequestFingerprint};
