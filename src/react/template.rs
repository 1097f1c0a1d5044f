//! ReAct prompt assembly: enumerates registered tools and
//! mandates the Thought/Action/Observation/Final contract, with optional
//! few-shot examples interpolated before the task. Generalizes the
//! hand-written system-prompt builder of a `ReActController`-style engine
//! into a `handlebars` template so callers can override the instruction
//! text while keeping variable substitution for `{tools}`/`{examples}`/`{task}`.

use handlebars::Handlebars;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::tools::ToolRegistry;

const DEFAULT_TEMPLATE: &str = r#"You solve tasks by alternating between reasoning and tool use.

Available tools:
{{#each tools}}
- {{name}}: {{description}}
  parameters: {{parameters}}
{{/each}}

Use exactly this format, one step per line:

Thought: <your reasoning about what to do next>
Action: <tool_name>(<args as a JSON object or a single value>)
Observation: <filled in by the runtime, do not write this yourself>

You may repeat Thought/Action/Observation as many times as needed. When you
know the answer, end with a line starting with `Final:` (or `Answer:`)
followed by the answer and nothing else on that line.
{{#if examples}}

Examples:
{{#each examples}}
{{this}}
{{/each}}
{{/if}}

Task:
{{task}}
"#;

/// One canonical-format few-shot example, rendered verbatim into the prompt.
#[derive(Debug, Clone)]
pub struct ReActExample {
    pub task: String,
    pub trace: Vec<(String, String)>,
}

impl ReActExample {
    /// Render as alternating `Header: body` lines, e.g.
    /// `[("Thought", "..."), ("Action", "search(\"x\")"), ("Observation", "...")]`.
    fn render(&self) -> String {
        let mut out = format!("Task:\n{}\n", self.task);
        for (header, body) in &self.trace {
            out.push_str(header);
            out.push_str(": ");
            out.push_str(body);
            out.push('\n');
        }
        out
    }
}

#[derive(Serialize)]
struct ToolView {
    name: String,
    description: String,
    parameters: String,
}

#[derive(Serialize)]
struct TemplateContext {
    tools: Vec<ToolView>,
    examples: Vec<String>,
    task: String,
}

/// Builds the system prompt for one ReAct run. Holds a compiled template so
/// repeated renders (one per iteration, for the static system message) don't
/// re-parse the Handlebars source.
pub struct PromptBuilder {
    handlebars: Handlebars<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        Self::with_template(DEFAULT_TEMPLATE)
    }

    /// Build with custom instruction text. Must retain `{{task}}` and
    /// reference `tools`/`examples` for substitution; callers are otherwise
    /// free to restyle the instructions.
    pub fn with_template(template: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars
            .register_template_string("react_system", template)
            .map_err(|e| Error::invalid_request(format!("invalid ReAct template: {e}")))?;
        Ok(PromptBuilder { handlebars })
    }

    pub fn render(&self, tools: &ToolRegistry, examples: &[ReActExample], task: &str) -> Result<String> {
        let context = TemplateContext {
            tools: tools
                .definitions()
                .into_iter()
                .map(|def| ToolView {
                    name: def.function.name,
                    description: def.function.description,
                    parameters: def.function.parameters.to_string(),
                })
                .collect(),
            examples: examples.iter().map(ReActExample::render).collect(),
            task: task.to_string(),
        };
        self.handlebars
            .render("react_system", &context)
            .map_err(|e| Error::internal(format!("template render failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes input back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success(""))
        }
    }

    #[test]
    fn renders_tool_list_and_task() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let builder = PromptBuilder::new().unwrap();

        let rendered = builder.render(&registry, &[], "What is the capital of France?").unwrap();

        assert!(rendered.contains("echo"));
        assert!(rendered.contains("echoes input back"));
        assert!(rendered.contains("What is the capital of France?"));
        assert!(rendered.contains("Thought:"));
        assert!(rendered.contains("Final:"));
    }

    #[test]
    fn renders_examples_when_present() {
        let registry = ToolRegistry::new();
        let builder = PromptBuilder::new().unwrap();
        let examples = vec![ReActExample {
            task: "2+2?".to_string(),
            trace: vec![
                ("Thought".to_string(), "I should add".to_string()),
                ("Action".to_string(), "add({\"a\":2,\"b\":2})".to_string()),
                ("Observation".to_string(), "4".to_string()),
                ("Final".to_string(), "4".to_string()),
            ],
        }];

        let rendered = builder.render(&registry, &examples, "3+3?").unwrap();
        assert!(rendered.contains("2+2?"));
        assert!(rendered.contains("I should add"));
    }
}
