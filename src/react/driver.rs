//! The ReAct loop driver: iterate provider calls, parse the
//! response into steps, execute any actions (reusing the tool loop's panic
//! isolation), and accumulate a trace until a `Final` step or iteration
//! exhaustion.

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::builder::dispatcher::{complete_with_context, DispatchContext};
use crate::core::{CompletionRequest, LlmProvider, Message, TimelineEvent};
use crate::error::{Error, Result};
use crate::tools::ToolRegistry;

use super::parser;
use super::step::{ReActMetrics, ReActResult, ReActStep};
use super::template::{PromptBuilder, ReActExample};

/// Tuning knobs for one ReAct run.
#[derive(Debug, Clone)]
pub struct ReActConfig {
    pub max_iterations: u32,
    pub stop_on_first_answer: bool,
    pub retry_on_error: bool,
    pub max_retries: u32,
    pub strict_parsing: bool,
}

impl Default for ReActConfig {
    fn default() -> Self {
        ReActConfig {
            max_iterations: 10,
            stop_on_first_answer: true,
            retry_on_error: true,
            max_retries: 2,
            strict_parsing: false,
        }
    }
}

/// Streaming events emitted in order: `start -> (thought|action|observation)* -> (final|error) -> complete`.
#[derive(Debug, Clone)]
pub enum ReActEvent {
    Start,
    Thought(String),
    Action { tool: String, args: Value },
    Observation(String),
    Final(String),
    Error(Error),
    Complete,
}

/// Optional lifecycle hooks. A panicking callback is caught and logged,
/// never fatal.
#[async_trait]
pub trait ReActCallbacks: Send + Sync {
    async fn on_step_start(&self, _iteration: u32, _thought: &str) {}
    async fn on_action(&self, _tool: &str, _args: &Value) {}
    async fn on_observation(&self, _text: &str) {}
    async fn on_step_complete(&self, _step: &ReActStep) {}
    async fn on_error(&self, _err: &Error, _iteration: u32) {}
    async fn on_complete(&self, _result: &ReActResult) {}
    async fn on_event(&self, _event: &ReActEvent) {}
}

pub struct NoopCallbacks;

#[async_trait]
impl ReActCallbacks for NoopCallbacks {}

async fn dispatch_callback<F, Fut>(label: &str, f: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let outcome = AssertUnwindSafe(f()).catch_unwind().await;
    if outcome.is_err() {
        warn!(callback = label, "ReAct callback panicked; ignoring");
    }
}

/// Drive one ReAct execution to completion or exhaustion. `ctx` is checked
/// between iterations and wraps each provider call; a cancelled context
/// yields a partial result with `success: false` rather than erroring, since
/// whatever steps ran up to that point remain meaningful to the caller.
pub async fn run_react(
    provider: &dyn LlmProvider,
    tools: &ToolRegistry,
    task: &str,
    examples: &[ReActExample],
    config: &ReActConfig,
    callbacks: &dyn ReActCallbacks,
    ctx: &DispatchContext,
) -> Result<ReActResult> {
    let started = Instant::now();
    let mut timeline: Vec<TimelineEvent> = Vec::new();
    dispatch_callback("on_event(start)", || callbacks.on_event(&ReActEvent::Start)).await;
    record(&mut timeline, started, "start", format!("task: {task}"));

    let prompt_builder = PromptBuilder::new()?;
    let system_prompt = prompt_builder.render(tools, examples, task)?;

    let mut trace_text = String::new();
    let mut steps: Vec<ReActStep> = Vec::new();
    let mut metrics = ReActMetrics::default();
    let mut iteration: u32 = 0;

    let result = loop {
        iteration += 1;
        if iteration > config.max_iterations {
            let err = Error::max_iterations(config.max_iterations);
            dispatch_callback("on_error", || callbacks.on_error(&err, iteration)).await;
            dispatch_callback("on_event(error)", || callbacks.on_event(&ReActEvent::Error(err_clone(&err)))).await;
            record(&mut timeline, started, "error", err.message.clone());
            break ReActResult {
                answer: String::new(),
                steps,
                iterations: iteration - 1,
                success: false,
                metrics: finalize_metrics(metrics, started),
                timeline,
            };
        }

        if ctx.cancellation.is_cancelled() {
            let err = Error::cancelled();
            dispatch_callback("on_error", || callbacks.on_error(&err, iteration)).await;
            record(&mut timeline, started, "cancelled", "cancellation requested".to_string());
            break ReActResult {
                answer: String::new(),
                steps,
                iterations: iteration - 1,
                success: false,
                metrics: finalize_metrics(metrics, started),
                timeline,
            };
        }

        let messages = vec![Message::system(&system_prompt), Message::user(format!("{trace_text}\nContinue:"))];
        let request = CompletionRequest::new(provider.default_model(), messages);

        let response = match complete_with_context(provider, &request, ctx).await {
            Ok(response) => response,
            Err(err) => {
                dispatch_callback("on_error", || callbacks.on_error(&err, iteration)).await;
                dispatch_callback("on_event(error)", || callbacks.on_event(&ReActEvent::Error(err_clone(&err)))).await;
                record(&mut timeline, started, "error", err.message.clone());
                steps.push(ReActStep::Error {
                    kind: err.kind,
                    detail: err.message.clone(),
                    iteration,
                });
                break ReActResult {
                    answer: String::new(),
                    steps,
                    iterations: iteration,
                    success: false,
                    metrics: finalize_metrics(metrics, started),
                    timeline,
                };
            }
        };

        if let Some(usage) = &response.usage {
            metrics.total_tokens += usage.total_tokens as u64;
        }

        let text = response
            .message()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let (parsed_steps, tier) = match parser::parse(&text, iteration, config.strict_parsing) {
            Ok(parsed) => parsed,
            Err(err) => {
                dispatch_callback("on_error", || callbacks.on_error(&err, iteration)).await;
                dispatch_callback("on_event(error)", || callbacks.on_event(&ReActEvent::Error(err_clone(&err)))).await;
                record(&mut timeline, started, "error", err.message.clone());
                steps.push(ReActStep::Error {
                    kind: err.kind,
                    detail: err.message.clone(),
                    iteration,
                });
                break ReActResult {
                    answer: String::new(),
                    steps,
                    iterations: iteration,
                    success: false,
                    metrics: finalize_metrics(metrics, started),
                    timeline,
                };
            }
        };
        debug!(?tier, iteration, "parsed ReAct response");

        let mut step_start_emitted = false;
        let mut final_answer: Option<String> = None;

        for step in parsed_steps {
            // The model is instructed never to write its own Observation, so a
            // parsed Observation block reflects a model that ignored the
            // instructions; it carries no executed result and is dropped
            // rather than trusted.
            if matches!(step, ReActStep::Observation { .. }) {
                continue;
            }

            match &step {
                ReActStep::Thought { text, .. } => {
                    if !step_start_emitted {
                        dispatch_callback("on_step_start", || callbacks.on_step_start(iteration, text)).await;
                        dispatch_callback("on_event(thought)", || {
                            callbacks.on_event(&ReActEvent::Thought(text.clone()))
                        })
                        .await;
                        record(&mut timeline, started, "thought", text.clone());
                        step_start_emitted = true;
                    }
                    trace_text.push_str("Thought: ");
                    trace_text.push_str(text);
                    trace_text.push('\n');
                }
                ReActStep::Action { tool, args, .. } => {
                    dispatch_callback("on_action", || callbacks.on_action(tool, args)).await;
                    dispatch_callback("on_event(action)", || {
                        callbacks.on_event(&ReActEvent::Action {
                            tool: tool.clone(),
                            args: args.clone(),
                        })
                    })
                    .await;
                    record(&mut timeline, started, "action", format!("{tool}({args})"));

                    let observation = execute_action(tools, tool, args.clone(), config).await;
                    metrics.tool_calls += 1;

                    trace_text.push_str(&format!("Action: {tool}({args})\n"));
                    trace_text.push_str("Observation: ");
                    trace_text.push_str(&observation);
                    trace_text.push('\n');

                    dispatch_callback("on_observation", || callbacks.on_observation(&observation)).await;
                    dispatch_callback("on_event(observation)", || {
                        callbacks.on_event(&ReActEvent::Observation(observation.clone()))
                    })
                    .await;
                    record(&mut timeline, started, "observation", observation.clone());

                    steps.push(ReActStep::Observation {
                        text: observation,
                        error: None,
                        iteration,
                    });
                }
                ReActStep::Final { answer, .. } => {
                    trace_text.push_str("Final: ");
                    trace_text.push_str(answer);
                    trace_text.push('\n');
                    final_answer = Some(answer.clone());
                }
                _ => {}
            }
            dispatch_callback("on_step_complete", || callbacks.on_step_complete(&step)).await;
            steps.push(step);
        }

        if let Some(answer) = final_answer {
            dispatch_callback("on_event(final)", || callbacks.on_event(&ReActEvent::Final(answer.clone()))).await;
            record(&mut timeline, started, "final", answer.clone());
            if config.stop_on_first_answer {
                break ReActResult {
                    answer,
                    steps,
                    iterations: iteration,
                    success: true,
                    metrics: finalize_metrics(metrics, started),
                    timeline,
                };
            }
        }
    };

    dispatch_callback("on_complete", || callbacks.on_complete(&result)).await;
    dispatch_callback("on_event(complete)", || callbacks.on_event(&ReActEvent::Complete)).await;

    Ok(result)
}

/// Execute `tool_name` with `args`, retrying the tool call itself (not the
/// surrounding LLM round) up to `config.max_retries` times on error — the
/// provider call already gets its own retry layer via
/// [`complete_with_context`]'s caller, so retrying here is specifically
/// about flaky tools.
async fn execute_action(tools: &ToolRegistry, tool_name: &str, args: Value, config: &ReActConfig) -> String {
    let mut attempt = 0;
    loop {
        let call = crate::core::ToolCall {
            id: "react".to_string(),
            call_type: "function".to_string(),
            function: crate::core::FunctionCall {
                name: tool_name.to_string(),
                arguments: args.to_string(),
            },
        };

        let outcome = AssertUnwindSafe(tools.execute(&call)).catch_unwind().await;
        let observation = match outcome {
            Ok(Ok(result)) => Ok(result.as_observation()),
            Ok(Err(err)) => Err(err.message),
            Err(panic) => {
                let payload = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool handler panicked".to_string());
                Err(Error::tool_panic(tool_name, payload).message)
            }
        };

        match observation {
            Ok(observation) => return observation,
            Err(message) if config.retry_on_error && attempt < config.max_retries => {
                attempt += 1;
                warn!(attempt, tool = tool_name, error = %message, "retrying ReAct tool action after error");
            }
            Err(message) => return message,
        }
    }
}

fn finalize_metrics(mut metrics: ReActMetrics, started: Instant) -> ReActMetrics {
    metrics.duration = started.elapsed();
    metrics
}

fn record(timeline: &mut Vec<TimelineEvent>, started: Instant, event_type: &str, description: String) {
    timeline.push(TimelineEvent::new(started.elapsed().as_millis() as u64, event_type, description));
}

fn err_clone(err: &Error) -> Error {
    let mut cloned = Error::new(err.kind, err.message.clone());
    for (k, v) in &err.context {
        cloned = cloned.with_context(k.clone(), v.clone());
    }
    cloned
}
