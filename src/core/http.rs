//! `ChatCompletionsProvider`: a vendor-neutral OpenAI-chat-completions-shaped
//! HTTP [`LlmProvider`] adapter any compatible endpoint can serve.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use super::provider::{LlmProvider, LlmStream, ProviderMeta, StreamingChunk};
use super::request::{CompletionRequest, CompletionResponse};

/// HTTP adapter speaking the OpenAI chat-completions wire shape.
pub struct ChatCompletionsProvider {
    client: Client,
    meta: ProviderMeta,
    default_model: String,
}

impl ChatCompletionsProvider {
    /// Build a provider against `base_url` (no trailing slash) authenticating
    /// with `api_key` via a bearer `Authorization` header.
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        default_model: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
                .map_err(|e| Error::invalid_request(format!("invalid API key: {e}")))?,
        );
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(Error::from)?;

        Ok(ChatCompletionsProvider {
            client,
            meta: ProviderMeta {
                id: "chat-completions".into(),
                name: "Chat Completions".into(),
                base_url,
                supports_streaming: true,
                supports_tools: true,
            },
            default_model: default_model.into(),
        })
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsProvider {
    fn meta(&self) -> &ProviderMeta {
        &self.meta
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let url = format!("{}/chat/completions", self.meta.base_url);
        debug!(model = %request.model, "sending completion request");

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();

        if status.is_success() {
            response.json::<CompletionResponse>().await.map_err(Error::from)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(match status.as_u16() {
                401 | 403 => Error::api_key_missing(format!("provider rejected credentials: {body}")),
                429 => {
                    warn!("provider rate limit hit");
                    Error::rate_limit(body)
                }
                400 | 404 | 422 => Error::invalid_request(format!("{status}: {body}")),
                _ => Error::invalid_response(format!("{status}: {body}")),
            })
        }
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<LlmStream> {
        let url = format!("{}/chat/completions", self.meta.base_url);
        let streaming_body = StreamingRequest { request, stream: true };
        let response = self.client.post(&url).json(&streaming_body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::invalid_response(format!("{status}: {body}")));
        }

        let byte_stream = response.bytes_stream();
        let parsed = stream::unfold((byte_stream, String::new(), false), |(mut bytes, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                if let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end_matches('\r').to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                        continue;
                    };
                    if data.is_empty() {
                        continue;
                    }
                    if data == "[DONE]" {
                        let chunk = StreamingChunk {
                            id: String::new(),
                            delta: String::new(),
                            is_final: true,
                            finish_reason: None,
                        };
                        return Some((Ok(chunk), (bytes, buffer, true)));
                    }

                    return match serde_json::from_str::<SseCompletionChunk>(data) {
                        Ok(parsed) => {
                            let choice = parsed.choices.into_iter().next();
                            let delta = choice.as_ref().and_then(|c| c.delta.content.clone()).unwrap_or_default();
                            let finish_reason = choice.and_then(|c| c.finish_reason);
                            let is_final = finish_reason.is_some();
                            let chunk = StreamingChunk {
                                id: parsed.id,
                                delta,
                                is_final,
                                finish_reason,
                            };
                            Some((Ok(chunk), (bytes, buffer, is_final)))
                        }
                        Err(e) => Some((Err(Error::from(e)), (bytes, buffer, true))),
                    };
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.push_str(&String::from_utf8_lossy(&chunk)),
                    Some(Err(e)) => return Some((Err(Error::from(e)), (bytes, buffer, true))),
                    None => return None,
                }
            }
        });

        Ok(Box::pin(parsed))
    }
}

/// The only difference between a streaming and non-streaming chat-completions
/// request on the wire: `stream: true`. Kept as a wrapper rather than a field
/// on [`CompletionRequest`] since "streaming or not" is a call-site decision,
/// not a property of the request itself.
#[derive(Serialize)]
struct StreamingRequest<'a> {
    #[serde(flatten)]
    request: &'a CompletionRequest,
    stream: bool,
}

/// One `data: {...}` chat-completions streaming chunk.
#[derive(Deserialize)]
struct SseCompletionChunk {
    #[serde(default)]
    id: String,
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn construction_rejects_malformed_key() {
        // A key containing a NUL byte is not representable as a header value.
        let bad = SecretString::from("bad\0key".to_string());
        let provider = ChatCompletionsProvider::new("https://example.com/v1", bad, "gpt-4o-mini");
        assert!(provider.is_err());
    }

    #[tokio::test]
    async fn stream_assembles_deltas_from_sse_chunks() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"Hel\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":null}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = ChatCompletionsProvider::new(
            server.uri(),
            SecretString::from("key".to_string()),
            "test-model",
        )
        .unwrap();
        let request = CompletionRequest::new("test-model", vec![crate::core::Message::user("hi")]);

        let mut chunks = provider.stream(&request).await.unwrap();
        let mut assembled = String::new();
        let mut saw_final = false;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.unwrap();
            assembled.push_str(&chunk.delta);
            if chunk.is_final && chunk.finish_reason.is_some() {
                saw_final = true;
                assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
            }
        }
        assert_eq!(assembled, "Hello");
        assert!(saw_final);
    }
}
