//! The tool-call round loop: call the provider, execute any
//! requested tools with panic isolation and bounded parallelism, append
//! results in original order, and re-dispatch until the model stops asking
//! for tools or `max_tool_rounds` is exhausted.

mod guard;

pub use guard::LoopGuard;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::builder::dispatcher::{complete_with_context, DispatchContext};
use crate::core::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Message, ToolCall};
use crate::error::{Error, Result};
use crate::tools::ToolRegistry;

/// Limits for the tool-call loop.
#[derive(Debug, Clone)]
pub struct ToolLoopConfig {
    /// Maximum follow-up provider calls after the first.
    pub max_tool_rounds: u32,
    /// Worker pool size for concurrent tool execution. Default 1 for
    /// deterministic ordering.
    pub max_parallel_tools: usize,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        ToolLoopConfig {
            max_tool_rounds: 10,
            max_parallel_tools: 1,
        }
    }
}

/// Observability hooks invoked around each tool execution. All methods are
/// optional; a panicking callback is caught and logged, never fatal.
#[async_trait]
pub trait ToolLoopCallbacks: Send + Sync {
    async fn on_tool_call(&self, _name: &str, _arguments: &str) {}
    async fn on_tool_result(&self, _name: &str, _result: &str, _error: Option<&Error>) {}
}

/// Default callbacks that do nothing.
pub struct NoopCallbacks;

#[async_trait]
impl ToolLoopCallbacks for NoopCallbacks {}

/// Outcome of a tool-loop run.
pub struct ToolLoopOutput {
    pub response: CompletionResponse,
    pub messages: Vec<Message>,
    pub rounds: u32,
    pub tool_calls_executed: u32,
}

/// Drive the tool-call loop to completion. `ctx` is checked between rounds
/// and wraps each provider call, so a caller-triggered cancellation or
/// deadline aborts the loop promptly instead of running to
/// `max_tool_rounds` regardless.
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    mut request: CompletionRequest,
    tools: Arc<ToolRegistry>,
    config: &ToolLoopConfig,
    callbacks: &dyn ToolLoopCallbacks,
    ctx: &DispatchContext,
) -> Result<ToolLoopOutput> {
    let mut rounds: u32 = 0;
    let mut tool_calls_executed: u32 = 0;
    let mut guard = LoopGuard::default();

    loop {
        if ctx.cancellation.is_cancelled() {
            return Err(Error::cancelled());
        }

        let mut response = complete_with_context(provider, &request, ctx).await?;
        let tool_calls = response.tool_calls().to_vec();

        if tool_calls.is_empty() {
            return Ok(ToolLoopOutput {
                response,
                messages: request.messages,
                rounds,
                tool_calls_executed,
            });
        }

        rounds += 1;
        if rounds > config.max_tool_rounds {
            warn!(rounds, "tool loop exhausted max_tool_rounds");
            if let Some(choice) = response.choices.first_mut() {
                choice.finish_reason = Some(FinishReason::MaxToolRounds);
            }
            return Ok(ToolLoopOutput {
                response,
                messages: request.messages,
                rounds,
                tool_calls_executed,
            });
        }

        let assistant_message = response
            .message()
            .cloned()
            .unwrap_or_else(|| Message::assistant(""));
        request.messages.push(assistant_message);

        let results = execute_calls(tools.clone(), &tool_calls, config.max_parallel_tools, callbacks).await;

        for (call, result) in tool_calls.iter().zip(results.into_iter()) {
            tool_calls_executed += 1;
            let content = match &result {
                Ok(tool_result) => tool_result.as_observation(),
                Err(err) => err.message.clone(),
            };

            request
                .messages
                .push(Message::tool(call.id.clone(), call.function.name.clone(), content.clone()));

            if let Some(hint) = guard.record(&call.function.name, &content) {
                request.messages.push(Message::user(hint));
            }
        }
    }
}

async fn execute_calls(
    tools: Arc<ToolRegistry>,
    calls: &[ToolCall],
    max_parallel: usize,
    callbacks: &dyn ToolLoopCallbacks,
) -> Vec<Result<crate::tools::ToolResult>> {
    for call in calls {
        callbacks.on_tool_call(&call.function.name, &call.function.arguments).await;
    }

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut join_set: JoinSet<(usize, Result<crate::tools::ToolResult>)> = JoinSet::new();

    for (index, call) in calls.iter().cloned().enumerate() {
        let tools = tools.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let started = Instant::now();
            let outcome = AssertUnwindSafe(tools.execute(&call)).catch_unwind().await;
            debug!(tool = %call.function.name, elapsed_ms = started.elapsed().as_millis() as u64, "tool executed");

            let result = match outcome {
                Ok(inner) => inner,
                Err(panic) => {
                    let payload = panic_message(panic);
                    Err(Error::tool_panic(call.function.name.clone(), payload))
                }
            };
            (index, result)
        });
    }

    let mut ordered: Vec<Option<Result<crate::tools::ToolResult>>> = (0..calls.len()).map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => ordered[index] = Some(result),
            Err(join_err) => {
                warn!(%join_err, "tool task join failed");
            }
        }
    }

    let results: Vec<Result<crate::tools::ToolResult>> = ordered
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(Error::internal("tool task did not complete"))))
        .collect();

    for (call, result) in calls.iter().zip(results.iter()) {
        let (content, err) = match result {
            Ok(r) => (r.as_observation(), None),
            Err(e) => (e.message.clone(), Some(e)),
        };
        callbacks.on_tool_result(&call.function.name, &content, err).await;
    }

    results
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CompletionResponse, Choice, FunctionCall, ProviderMeta};
    use crate::core::LlmStream;
    use crate::tools::{Tool, ToolResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Adder;

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "add"
        }
        fn description(&self) -> &str {
            "adds two numbers"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"a": {"type": "number"}, "b": {"type": "number"}}, "required": ["a", "b"], "additionalProperties": false})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<ToolResult> {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(ToolResult::success((a + b).to_string()))
        }
    }

    struct Panics;

    #[async_trait]
    impl Tool for Panics {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}, "required": [], "additionalProperties": true})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolResult> {
            panic!("boom");
        }
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
        meta: ProviderMeta,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            ScriptedProvider {
                calls: AtomicUsize::new(0),
                meta: ProviderMeta {
                    id: "scripted".into(),
                    name: "scripted".into(),
                    base_url: String::new(),
                    supports_streaming: false,
                    supports_tools: true,
                },
            }
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }
        fn default_model(&self) -> &str {
            "scripted-model"
        }
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            if call_index == 0 {
                Ok(CompletionResponse {
                    id: "1".into(),
                    model: "scripted-model".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant_with_tool_calls(
                            "",
                            vec![ToolCall {
                                id: "call_1".into(),
                                call_type: "function".into(),
                                function: FunctionCall {
                                    name: "add".into(),
                                    arguments: "{\"a\":2,\"b\":3}".into(),
                                },
                            }],
                        ),
                        finish_reason: Some(FinishReason::ToolCalls),
                    }],
                    usage: None,
                })
            } else {
                Ok(CompletionResponse {
                    id: "2".into(),
                    model: "scripted-model".into(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant("5"),
                        finish_reason: Some(FinishReason::Stop),
                    }],
                    usage: None,
                })
            }
        }
        async fn stream(&self, _request: &CompletionRequest) -> Result<LlmStream> {
            Err(Error::invalid_request("streaming not supported in test"))
        }
    }

    #[tokio::test]
    async fn stops_when_no_tool_calls_requested() {
        let mut registry = ToolRegistry::new();
        registry.register(Adder);
        let provider = ScriptedProvider::new();
        let request = CompletionRequest::new("scripted-model", vec![Message::user("2+3?")]);

        let output = run_tool_loop(
            &provider,
            request,
            Arc::new(registry),
            &ToolLoopConfig::default(),
            &NoopCallbacks,
            &DispatchContext::default(),
        )
        .await
        .unwrap();

        assert_eq!(output.rounds, 1);
        assert_eq!(output.tool_calls_executed, 1);
        assert_eq!(output.response.message().unwrap().content, "5");
    }

    #[tokio::test]
    async fn cancelled_context_aborts_before_dispatching() {
        let mut registry = ToolRegistry::new();
        registry.register(Adder);
        let provider = ScriptedProvider::new();
        let request = CompletionRequest::new("scripted-model", vec![Message::user("2+3?")]);
        let ctx = DispatchContext::default();
        ctx.cancellation.cancel();

        let err = run_tool_loop(
            &provider,
            request,
            Arc::new(registry),
            &ToolLoopConfig::default(),
            &NoopCallbacks,
            &ctx,
        )
        .await
        .unwrap_err();

        assert_eq!(err.kind, crate::error::ErrorKind::ContextCancelled);
    }

    #[tokio::test]
    async fn panicking_tool_becomes_tool_panic_observation() {
        let mut registry = ToolRegistry::new();
        registry.register(Panics);
        let call = ToolCall {
            id: "x".into(),
            call_type: "function".into(),
            function: FunctionCall {
                name: "boom".into(),
                arguments: "{}".into(),
            },
        };
        let results = execute_calls(Arc::new(registry), &[call], 1, &NoopCallbacks).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap_err().kind, crate::error::ErrorKind::ToolPanic);
    }
}
