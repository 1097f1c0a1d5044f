//! Core abstractions: messages, completion requests/responses, and the
//! [`LlmProvider`] trait that normalizes provider backends.

mod message;
mod provider;
mod request;
mod timeline;
pub mod http;

pub use message::{Role, Message, ToolCall, FunctionCall};
pub use provider::{LlmProvider, LlmStream, ProviderMeta, StreamingChunk};
pub use request::{
    CompletionRequest, CompletionResponse, Choice, FinishReason, FunctionDefinition, ToolChoice,
    ToolDefinition, Usage,
};
pub use timeline::TimelineEvent;
pub use http::ChatCompletionsProvider;
