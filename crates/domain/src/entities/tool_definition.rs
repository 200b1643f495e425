//! Tool (function) definitions offered to the model

use serde::{Deserialize, Serialize};

/// A tool the model may call
///
/// `parameters` holds the JSON schema text exactly as the caller supplied it.
/// An empty string means the tool takes no parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name as exposed to the model
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// JSON schema describing the arguments
    #[serde(default)]
    pub parameters: String,
}

impl ToolDefinition {
    /// Create a tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: parameters.into(),
        }
    }

    /// Whether the tool declares a parameter schema
    pub fn has_parameters(&self) -> bool {
        !self.parameters.trim().is_empty()
    }
}
