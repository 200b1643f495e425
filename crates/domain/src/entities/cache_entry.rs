//! Cache entry entity - the unit stored by every cache tier

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::CompletionResponse;
use crate::value_objects::{CacheKey, RequestFingerprint};

/// A cached completion together with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Lookup key
    pub key: CacheKey,
    /// Fingerprint the key was derived from
    pub fingerprint: RequestFingerprint,
    /// Cached response payload
    pub response: CompletionResponse,
    /// When the entry was created
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served
    pub expires_at: DateTime<Utc>,
    /// Successful reads so far
    #[serde(default)]
    pub access_count: u64,
    /// Integrity checksum over key, fingerprint and response
    ///
    /// Empty for entries written before checksums existed.
    #[serde(default)]
    pub checksum: String,
}

impl CacheEntry {
    /// Create a fresh entry expiring `ttl` from now
    pub fn new(
        key: CacheKey,
        fingerprint: RequestFingerprint,
        response: CompletionResponse,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            key,
            fingerprint,
            response,
            created_at,
            expires_at: expiry_after(created_at, ttl),
            access_count: 0,
            checksum: String::new(),
        }
    }

    /// Whether the entry is expired right now
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the entry is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Count one successful read
    pub fn record_access(&mut self) {
        self.access_count = self.access_count.saturating_add(1);
    }

    /// Latest permissible expiry for a given lifetime
    pub fn expiry_cap(&self, ttl: Duration) -> DateTime<Utc> {
        expiry_after(self.created_at, ttl)
    }

    /// Rough in-memory size of the entry in bytes
    pub fn approximate_size(&self) -> usize {
        let response = self.response.content.len()
            + self
                .response
                .tool_calls
                .iter()
                .map(|c| c.id.len() + c.name.len() + c.arguments.len())
                .sum::<usize>();
        self.key.as_str().len() + self.fingerprint.approximate_size() + response
    }
}

/// `start + ttl`, saturating at the latest representable instant
fn expiry_after(start: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| start.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
