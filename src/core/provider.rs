//! The [`LlmProvider`] trait: the single seam between AgentCore and any LLM backend.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use super::request::CompletionRequest;
use super::request::CompletionResponse;

/// Static metadata describing a provider implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMeta {
    pub id: String,
    pub name: String,
    pub base_url: String,
    pub supports_streaming: bool,
    pub supports_tools: bool,
}

/// A single chunk of a streamed completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingChunk {
    pub id: String,
    pub delta: String,
    pub is_final: bool,
    pub finish_reason: Option<String>,
}

/// A stream of completion chunks.
pub type LlmStream = Pin<Box<dyn Stream<Item = Result<StreamingChunk>> + Send>>;

/// Abstract interface normalizing LLM backends.
///
/// Implementors translate [`CompletionRequest`]/[`CompletionResponse`] to and
/// from their wire format and normalize provider-specific quirks (missing
/// `finish_reason`, differing tool-call envelopes, absent usage stats) so the
/// rest of AgentCore never branches on provider identity.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider metadata.
    fn meta(&self) -> &ProviderMeta;

    /// The model used when a request doesn't specify one.
    fn default_model(&self) -> &str;

    /// Issue a non-streaming completion request.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;

    /// Issue a streaming completion request.
    ///
    /// Providers that don't support streaming should return
    /// [`crate::error::ErrorKind::InvalidRequest`].
    async fn stream(&self, request: &CompletionRequest) -> Result<LlmStream>;

    /// Lightweight health probe; default implementation issues a minimal
    /// completion request and discards the result.
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}
