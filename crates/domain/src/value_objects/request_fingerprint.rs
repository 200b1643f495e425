//! Request fingerprint - the part of a request that decides its cached identity
//!
//! Only fields that change the content of a response are kept. The output
//! token cap is not one of them: two requests differing only in `max_tokens`
//! share a fingerprint.

use serde::{Deserialize, Serialize};

use crate::entities::MessageRole;

/// One conversation turn as seen by the cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintMessage {
    /// Role of the sender
    pub role: MessageRole,
    /// Textual content
    pub content: String,
    /// Tool call correlation id, if any
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

/// One tool definition as seen by the cache
///
/// `parameters` is the canonical JSON form of the schema (object keys sorted),
/// or `null` when the tool takes no parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintTool {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// Canonical parameter schema
    pub parameters: serde_json::Value,
}

/// Normalized, order-preserving projection of a completion request
///
/// The declaration order of the fields is the canonical serialization order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFingerprint {
    /// System instructions
    pub system: Option<String>,
    /// Conversation turns, in request order
    pub messages: Vec<FingerprintMessage>,
    /// Tool definitions, in request order
    pub tools: Vec<FingerprintTool>,
    /// Sampling temperature
    pub temperature: Option<f32>,
}

impl RequestFingerprint {
    /// Rough size of the text carried by the fingerprint
    pub fn approximate_size(&self) -> usize {
        let system = self.system.as_ref().map_or(0, String::len);
        let messages: usize = self
            .messages
            .iter()
            .map(|m| m.content.len() + m.tool_call_id.as_ref().map_or(0, String::len))
            .sum();
        let tools: usize = self
            .tools
            .iter()
            .map(|t| t.name.len() + t.description.len() + t.parameters.to_string().len())
            .sum();
        system + messages + tools
    }
}
