//! Domain entities - Request/response shapes and the cached unit

mod cache_entry;
mod chat_message;
mod completion;
mod tool_definition;

pub use cache_entry::CacheEntry;
pub use chat_message::{ChatMessage, MessageRole};
pub use completion::{CompletionRequest, CompletionResponse, TokenUsage, ToolCall};
pub use tool_definition::ToolDefinition;
