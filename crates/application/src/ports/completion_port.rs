//! Completion port - Interface for the remote model call being cached

use async_trait::async_trait;
use domain::{CompletionRequest, CompletionResponse};
#[cfg(test)]
use mockall::automock;

use crate::error::ApplicationError;

/// Port for completion operations
///
/// Implemented by provider clients and by caching decorators around them, so
/// callers cannot tell whether a cache sits in between.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionPort: Send + Sync {
    /// Run a completion
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ApplicationError>;

    /// Check if the backend is healthy
    async fn is_healthy(&self) -> bool;

    /// Identifier of the provider behind this port
    fn provider_name(&self) -> String;

    /// Whether the provider accepts tool definitions
    fn supports_tools(&self) -> bool;

    /// Whether the provider can stream partial output
    fn supports_streaming(&self) -> bool;
}
