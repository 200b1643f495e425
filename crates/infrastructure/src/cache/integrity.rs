//! Per-entry integrity checksums for the persistent tier
//!
//! The checksum catches accidental damage (truncated writes, hand edits); it
//! is not a security control. Entries without a checksum predate it and are
//! trusted as-is.

use domain::{CacheEntry, CacheKey, CompletionResponse, RequestFingerprint};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::key::canonical_bytes;

/// Outcome of checking an entry against its stored checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// Stored checksum matches the content
    Valid,
    /// No checksum stored
    Legacy,
    /// Stored checksum does not match the content
    Mismatch,
}

#[derive(Serialize)]
struct ChecksumInput<'a> {
    key: &'a CacheKey,
    fingerprint: &'a RequestFingerprint,
    response: &'a CompletionResponse,
}

/// SHA-256 hex digest over an entry's key, fingerprint and response
pub fn compute_checksum(entry: &CacheEntry) -> String {
    let input = ChecksumInput {
        key: &entry.key,
        fingerprint: &entry.fingerprint,
        response: &entry.response,
    };
    // In-memory serialization of these types cannot fail.
    let bytes = canonical_bytes(&input).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

/// Stamp an entry with its current checksum
pub fn seal(entry: &mut CacheEntry) {
    entry.checksum = compute_checksum(entry);
}

/// Check an entry against its stored checksum
pub fn verify(entry: &CacheEntry) -> ChecksumStatus {
    if entry.checksum.is_empty() {
        ChecksumStatus::Legacy
    } else if entry.checksum == compute_checksum(entry) {
        ChecksumStatus::Valid
    } else {
        ChecksumStatus::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use domain::CompletionRequest;

    use super::*;
    use crate::cache::key::generate_cache_key;

    fn entry(content: &str) -> CacheEntry {
        let (key, fp) = generate_cache_key(&CompletionRequest::new().with_user_message("q")).unwrap();
        CacheEntry::new(key, fp, CompletionResponse::text(content), Duration::from_secs(60))
    }

    #[test]
    fn unsealed_entry_is_legacy() {
        assert_eq!(verify(&entry("a")), ChecksumStatus::Legacy);
    }

    #[test]
    fn sealed_entry_is_valid() {
        let mut e = entry("a");
        seal(&mut e);
        assert_eq!(e.checksum.len(), 64);
        assert_eq!(verify(&e), ChecksumStatus::Valid);
    }

    #[test]
    fn tampered_response_is_detected() {
        let mut e = entry("a");
        seal(&mut e);
        e.response.content = "b".into();
        assert_eq!(verify(&e), ChecksumStatus::Mismatch);
    }

    #[test]
    fn bookkeeping_fields_do_not_affect_checksum() {
        let mut e = entry("a");
        seal(&mut e);
        e.access_count = 99;
        e.expires_at = e.created_at;
        assert_eq!(verify(&e), ChecksumStatus::Valid);
    }

    #[test]
    fn checksum_survives_json_roundtrip() {
        let mut e = entry("a");
        e.fingerprint.temperature = Some(0.7);
        seal(&mut e);
        let json = serde_json::to_string(&e).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(verify(&back), ChecksumStatus::Valid);
    }
}
