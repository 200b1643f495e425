//! Cache key derivation
//!
//! A request is first projected onto its [`RequestFingerprint`], which is then
//! serialized canonically (struct field order, object keys sorted) and hashed
//! with SHA-256. Semantically equal requests always produce the same key no
//! matter how their tool schemas were formatted.

use domain::{
    CacheKey, CompletionRequest, FingerprintMessage, FingerprintTool, RequestFingerprint,
    ToolDefinition,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reasons a request cannot be normalized into a cache key
#[derive(Debug, Error)]
pub enum CacheKeyError {
    /// A tool's parameter schema is not valid JSON
    #[error("Tool '{tool}' has an invalid parameter schema: {source}")]
    InvalidToolSchema {
        /// Name of the offending tool
        tool: String,
        /// Parse failure
        #[source]
        source: serde_json::Error,
    },

    /// Temperature is NaN or infinite and has no canonical form
    #[error("Temperature {0} is not a finite number")]
    NonFiniteTemperature(f32),

    /// Canonical serialization failed
    #[error("Fingerprint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Project a request onto the fields that determine its cached identity
pub fn fingerprint(request: &CompletionRequest) -> Result<RequestFingerprint, CacheKeyError> {
    if let Some(t) = request.temperature.filter(|t| !t.is_finite()) {
        return Err(CacheKeyError::NonFiniteTemperature(t));
    }

    let messages = request
        .messages
        .iter()
        .map(|m| FingerprintMessage {
            role: m.role,
            content: m.content.clone(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect();

    let tools = request
        .tools
        .iter()
        .map(fingerprint_tool)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RequestFingerprint {
        system: request.system.clone(),
        messages,
        tools,
        temperature: request.temperature,
    })
}

/// Hash a fingerprint into its cache key
pub fn cache_key(fingerprint: &RequestFingerprint) -> Result<CacheKey, CacheKeyError> {
    let bytes = canonical_bytes(fingerprint)?;
    let digest: [u8; 32] = Sha256::digest(&bytes).into();
    Ok(CacheKey::from_digest(&digest))
}

/// Derive both the key and the fingerprint for a request
pub fn generate_cache_key(
    request: &CompletionRequest,
) -> Result<(CacheKey, RequestFingerprint), CacheKeyError> {
    let fp = fingerprint(request)?;
    let key = cache_key(&fp)?;
    Ok((key, fp))
}

/// Serialize any value with object keys sorted at every depth
pub(crate) fn canonical_bytes<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let tree = serde_json::to_value(value)?;
    serde_json::to_vec(&canonicalize(tree))
}

fn fingerprint_tool(tool: &ToolDefinition) -> Result<FingerprintTool, CacheKeyError> {
    let parameters = if tool.has_parameters() {
        let parsed: Value = serde_json::from_str(&tool.parameters).map_err(|source| {
            CacheKeyError::InvalidToolSchema {
                tool: tool.name.clone(),
                source,
            }
        })?;
        canonicalize(parsed)
    } else {
        Value::Null
    };

    Ok(FingerprintTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    })
}

/// Rebuild objects with their keys in sorted order
///
/// Needed because `serde_json::Map` keeps insertion order when the
/// `preserve_order` feature is enabled anywhere in the dependency graph.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::with_capacity(entries.len());
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
