//! The [`Tool`] trait and its result type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{FunctionDefinition, ToolDefinition};
use crate::error::Result;

/// A tool the model may invoke.
///
/// Handlers receive the raw JSON arguments and MUST validate them
/// themselves — the core does not
/// enforce schema conformance on the way in.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema Draft-07 object describing accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool. MUST NOT panic for expected input; if it does, the
    /// tool loop recovers and converts the panic to [`crate::error::ErrorKind::ToolPanic`].
    async fn execute(&self, args: Value) -> Result<ToolResult>;

    /// Convert this tool into its wire-level [`ToolDefinition`].
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                parameters: self.parameters_schema(),
            },
        }
    }
}

/// Outcome of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
            metadata: None,
        }
    }

    pub fn success_with_metadata(content: impl Into<String>, metadata: Value) -> Self {
        ToolResult {
            success: true,
            content: Some(content.into()),
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        ToolResult {
            success: false,
            content: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    /// Render as the text the model should see as the tool's observation.
    pub fn as_observation(&self) -> String {
        if self.success {
            self.content.clone().unwrap_or_default()
        } else {
            format!("Error: {}", self.error.clone().unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_observation_is_prefixed() {
        let result = ToolResult::failure("bad input");
        assert_eq!(result.as_observation(), "Error: bad input");
    }

    #[test]
    fn success_observation_is_plain_content() {
        let result = ToolResult::success("42");
        assert_eq!(result.as_observation(), "42");
    }
}
