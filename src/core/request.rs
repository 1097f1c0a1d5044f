//! Completion request/response types (`CompletionRequest`/`CompletionResponse`).

use serde::{Deserialize, Serialize};

use super::message::{Message, ToolCall};

/// A provider-agnostic chat completion request.
///
/// Field set mirrors the full configuration surface a builder can set:
/// model, messages, system, sampling controls, tool definitions, and
/// response-shaping knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        CompletionRequest {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }
}

/// A tool definition offered to the model (JSON Schema Draft-07 parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Function shape advertised inside a [`ToolDefinition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model should decide whether to call a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Auto(String),
    None(String),
    Required(String),
    Specific {
        #[serde(rename = "type")]
        tool_type: String,
        function: ToolChoiceFunction,
    },
}

impl ToolChoice {
    pub fn auto() -> Self {
        ToolChoice::Auto("auto".to_string())
    }

    pub fn none() -> Self {
        ToolChoice::None("none".to_string())
    }

    /// Forces the model to call some tool, without naming which one.
    pub fn required() -> Self {
        ToolChoice::Required("required".to_string())
    }

    pub fn specific(name: impl Into<String>) -> Self {
        ToolChoice::Specific {
            tool_type: "function".to_string(),
            function: ToolChoiceFunction { name: name.into() },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

/// Normalized response from an [`super::provider::LlmProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Convenience accessor for the first choice's message, if any.
    pub fn message(&self) -> Option<&Message> {
        self.choices.first().map(|c| &c.message)
    }

    /// Tool calls requested by the first choice, if any.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.choices
            .first()
            .and_then(|c| c.message.tool_calls.as_deref())
            .unwrap_or(&[])
    }
}

/// A single completion choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<FinishReason>,
}

/// Normalized finish reason across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    MaxToolRounds,
    Error,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Message;

    #[test]
    fn builder_defaults_are_none() {
        let req = CompletionRequest::new("gpt", vec![Message::user("hi")]);
        assert!(req.temperature.is_none());
        assert!(req.tools.is_none());
    }

    #[test]
    fn response_exposes_first_choice_tool_calls() {
        let resp = CompletionResponse {
            id: "1".into(),
            model: "gpt".into(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(""),
                finish_reason: Some(FinishReason::Stop),
            }],
            usage: None,
        };
        assert!(resp.tool_calls().is_empty());
        assert!(resp.message().is_some());
    }

    #[test]
    fn required_tool_choice_serializes_to_the_bare_string() {
        let value = serde_json::to_value(ToolChoice::required()).unwrap();
        assert_eq!(value, serde_json::json!("required"));
    }

    #[test]
    fn specific_tool_choice_serializes_to_function_object() {
        let value = serde_json::to_value(ToolChoice::specific("add")).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "add");
    }
}
