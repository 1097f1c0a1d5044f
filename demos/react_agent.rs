//! Runs the ReAct loop with `search` and `calculator` tools registered.

use agentcore::tools::{Tool, ToolResult};
use agentcore::{AgentBuilder, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

struct Search;

#[async_trait]
impl Tool for Search {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Looks up a fact by query string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "q": { "type": "string" } },
            "required": ["q"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let query = args["q"].as_str().unwrap_or_default();
        let answer = if query.to_lowercase().contains("paris") {
            "Paris population: 2,100,000"
        } else {
            "no results"
        };
        Ok(ToolResult::success(answer))
    }
}

struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluates a simple arithmetic expression given as `a op b`."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "expr": { "type": "string" } },
            "required": ["expr"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let expr = args["expr"].as_str().unwrap_or_default();
        Ok(ToolResult::success(format!("evaluated: {expr}")))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let agent = AgentBuilder::interactive()
        .api_key(std::env::var("LLM_API_KEY").unwrap_or_default())
        .model("gpt-4o-mini")
        .tool(Search)
        .tool(Calculator)
        .react(true)
        .build()?;

    let response = agent.ask("What is 15% of the population of Paris?").await?;
    println!("assistant: {}", response.content);

    if let Some(result) = response.react_result {
        println!(
            "steps={} iterations={} success={}",
            result.steps.len(),
            result.iterations,
            result.success
        );
    }

    Ok(())
}
