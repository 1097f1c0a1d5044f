//! Working-memory compression: synthesize a block of messages into a
//! single summary via an LLM call. The naive approach — holding the
//! memory lock while awaiting that call — deadlocks under contention
//! (compression may itself trigger further memory reads). [`HierarchicalMemory`]
//! enforces the fix structurally: callers must clone the to-be-compressed
//! window, call [`Compressor::compress`] with no lock held, and only then
//! reacquire the lock to swap the result in.

use async_trait::async_trait;

use crate::core::{CompletionRequest, LlmProvider, Message};
use crate::error::Result;

/// Synthesizes a block of messages into a single summary message.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, messages: &[Message]) -> Result<Message>;
}

/// Dependency-free fallback: concatenates message contents into one
/// assistant-authored summary line. Useful for tests and for callers who
/// don't want compression to cost a model call.
pub struct ConcatCompressor {
    pub max_chars: usize,
}

impl Default for ConcatCompressor {
    fn default() -> Self {
        ConcatCompressor { max_chars: 500 }
    }
}

#[async_trait]
impl Compressor for ConcatCompressor {
    async fn compress(&self, messages: &[Message]) -> Result<Message> {
        let mut joined = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join(" | ");
        joined.truncate(self.max_chars);
        Ok(Message::system(format!("[compressed summary] {joined}")))
    }
}

/// LLM-backed compressor, synthesizing one plain summary message per window
/// (a richer key-facts/preferences/topics shape stays available to callers
/// that want it, via a custom [`Compressor`] impl over the same provider
/// seam).
pub struct LlmCompressor {
    provider: std::sync::Arc<dyn LlmProvider>,
    model: String,
}

impl LlmCompressor {
    pub fn new(provider: std::sync::Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        LlmCompressor {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Compressor for LlmCompressor {
    async fn compress(&self, messages: &[Message]) -> Result<Message> {
        let conversation = messages
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Summarize this conversation in 1-2 sentences, preserving any facts \
             the user stated about themselves:\n---\n{conversation}\n---"
        );

        let request = CompletionRequest::new(self.model.clone(), vec![Message::user(prompt)]);
        let response = self.provider.complete(&request).await?;
        let summary = response.message().map(|m| m.content.clone()).unwrap_or_default();
        Ok(Message::system(format!("[compressed summary] {summary}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concat_compressor_produces_one_message() {
        let compressor = ConcatCompressor::default();
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        let summary = compressor.compress(&messages).await.unwrap();
        assert!(summary.content.contains("compressed summary"));
        assert!(summary.content.contains("hi"));
    }

    #[tokio::test]
    async fn concat_compressor_truncates_to_max_chars() {
        let compressor = ConcatCompressor { max_chars: 20 };
        let messages = vec![Message::user("a".repeat(100))];
        let summary = compressor.compress(&messages).await.unwrap();
        assert!(summary.content.len() <= 20);
    }
}
