//! Registers an `add` tool and lets the agent auto-execute tool calls until
//! it produces a final answer.

use agentcore::tools::{Tool, ToolResult};
use agentcore::{AgentBuilder, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

struct Add;

#[async_trait]
impl Tool for Add {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Adds two numbers and returns the sum."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["a", "b"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let a = args["a"].as_f64().unwrap_or(0.0);
        let b = args["b"].as_f64().unwrap_or(0.0);
        Ok(ToolResult::success((a + b).to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let agent = AgentBuilder::interactive()
        .api_key(std::env::var("LLM_API_KEY").unwrap_or_default())
        .model("gpt-4o-mini")
        .tool(Add)
        .max_tool_rounds(3)
        .build()?;

    let response = agent.ask("What is 2 plus 3 plus 4?").await?;
    println!("assistant: {}", response.content);
    println!("tool rounds: {:?}", response.tool_rounds);

    Ok(())
}
