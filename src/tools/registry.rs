//! Registry of available tools (invariant: names unique, last wins).

use std::collections::HashMap;

use crate::core::{ToolCall, ToolDefinition};
use crate::error::{Error, Result};

use super::traits::{Tool, ToolResult};

/// Registry of tools available to a builder/agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool registered under a name that already exists
    /// replaces the previous one: duplicates replace, last wins.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call by parsing its JSON argument string and invoking
    /// the matching handler. Returns `Err(ErrorKind::ToolNotFound)` for an
    /// unregistered name; callers (the tool loop, the ReAct loop) are
    /// responsible for surfacing that as the observation rather than
    /// treating it as fatal.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self
            .get(&call.function.name)
            .ok_or_else(|| Error::tool_not_found(call.function.name.clone()))?;

        let args: serde_json::Value = serde_json::from_str(&call.function.arguments)
            .unwrap_or(serde_json::Value::Null);

        tool.execute(args).await
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}, "required": [], "additionalProperties": true})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<ToolResult> {
            Ok(ToolResult::success(args.to_string()))
        }
    }

    fn call(name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            call_type: "function".into(),
            function: crate::core::FunctionCall {
                name: name.into(),
                arguments: args.into(),
            },
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_tool_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.execute(&call("missing", "{}")).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ToolNotFound);
    }

    #[tokio::test]
    async fn last_registration_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        registry.register(Echo);
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let result = registry.execute(&call("echo", "{\"x\":1}")).await.unwrap();
        assert!(result.success);
    }
}
