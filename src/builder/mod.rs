//! The fluent configuration surface: accumulate model, sampling,
//! persona, memory, tool, ReAct, and planner settings, then dispatch through
//! whichever of Planner / ReAct / Tool Loop / single-shot the configuration
//! selects. One config struct assembled fluently, then handed to a single
//! terminal runner function.

pub mod dispatcher;

pub use dispatcher::{CancellationSignal, DispatchContext, Dispatcher, DispatcherSettings};

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use secrecy::SecretString;

use crate::core::{
    Choice, ChatCompletionsProvider, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Message,
    StreamingChunk, ToolChoice, ToolDefinition,
};
use crate::error::{Error, Result};
use crate::memory::{HierarchicalMemory, MemoryConfig};
use crate::planner::{PlanExecutor, PlanOutput, PlannerConfig, Plan};
use crate::react::{self, ReActCallbacks, ReActConfig, ReActExample, ReActResult};
use crate::toolloop::{self, ToolLoopCallbacks, ToolLoopConfig};
use crate::tools::{Tool, ToolRegistry};

/// A named persona whose system prompt is prepended ahead of the caller's
/// own configured system prompt.
#[derive(Debug, Clone)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Persona {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// The full enumerated configuration surface an [`AgentBuilder`] accumulates.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub model: String,
    pub system: Option<String>,
    pub persona: Option<Persona>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub stop: Option<Vec<String>>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub seed: Option<u64>,
    pub n: Option<u32>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<serde_json::Value>,
    pub memory_enabled: bool,
    pub max_history: usize,
    pub recall_top_k: usize,
    pub auto_execute_tools: bool,
    pub max_tool_rounds: u32,
    pub max_parallel_tools: usize,
    pub react_enabled: bool,
    pub timeout: Option<Duration>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            model: String::new(),
            system: None,
            persona: None,
            temperature: None,
            max_tokens: None,
            top_p: None,
            stop: None,
            presence_penalty: None,
            frequency_penalty: None,
            seed: None,
            n: None,
            logprobs: None,
            top_logprobs: None,
            tool_choice: None,
            response_format: None,
            memory_enabled: false,
            max_history: 20,
            recall_top_k: 3,
            auto_execute_tools: true,
            max_tool_rounds: 10,
            max_parallel_tools: 1,
            react_enabled: false,
            timeout: None,
        }
    }
}

/// Fluent assembly of an [`Agent`]. Mutated only by configuration methods
/// prior to the first dispatch.
pub struct AgentBuilder {
    config: BuilderConfig,
    base_url: String,
    api_key: Option<SecretString>,
    provider: Option<Arc<dyn LlmProvider>>,
    dispatcher_settings: DispatcherSettings,
    tools: ToolRegistry,
    memory_config: MemoryConfig,
    react_config: ReActConfig,
    react_examples: Vec<ReActExample>,
    planner_config: PlannerConfig,
    tool_loop_callbacks: Option<Arc<dyn ToolLoopCallbacks>>,
    react_callbacks: Option<Arc<dyn ReActCallbacks>>,
    stream_callbacks: Option<Arc<dyn StreamCallbacks>>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        AgentBuilder {
            config: BuilderConfig::default(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            provider: None,
            dispatcher_settings: DispatcherSettings::default(),
            tools: ToolRegistry::new(),
            memory_config: MemoryConfig::default(),
            react_config: ReActConfig::default(),
            react_examples: Vec::new(),
            planner_config: PlannerConfig::default(),
            tool_loop_callbacks: None,
            react_callbacks: None,
            stream_callbacks: None,
        }
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generous round/iteration limits suitable for an interactive chat
    /// surface (high iteration ceilings, memory on by default).
    pub fn interactive() -> Self {
        let mut builder = Self::new();
        builder.config.max_tool_rounds = 20;
        builder.config.memory_enabled = true;
        builder
    }

    /// Tighter limits and no memory carried between calls, suitable for a
    /// one-shot batch/scheduler-style invocation (no fallback chatter,
    /// bounded rounds).
    pub fn batch() -> Self {
        let mut builder = Self::new();
        builder.config.max_tool_rounds = 10;
        builder.config.memory_enabled = false;
        builder
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.config.system = Some(system.into());
        self
    }

    pub fn persona(mut self, persona: Persona) -> Self {
        self.config.persona = Some(persona);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.max_tokens = Some(max_tokens);
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.config.top_p = Some(top_p);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.config.stop = Some(stop);
        self
    }

    pub fn presence_penalty(mut self, value: f32) -> Self {
        self.config.presence_penalty = Some(value);
        self
    }

    pub fn frequency_penalty(mut self, value: f32) -> Self {
        self.config.frequency_penalty = Some(value);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn n(mut self, n: u32) -> Self {
        self.config.n = Some(n);
        self
    }

    pub fn logprobs(mut self, enabled: bool, top_logprobs: Option<u32>) -> Self {
        self.config.logprobs = Some(enabled);
        self.config.top_logprobs = top_logprobs;
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.config.tool_choice = Some(choice);
        self
    }

    pub fn response_format(mut self, format: serde_json::Value) -> Self {
        self.config.response_format = Some(format);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Supply a custom provider adapter, bypassing the default
    /// `ChatCompletionsProvider` construction.
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn memory(mut self, enabled: bool) -> Self {
        self.config.memory_enabled = enabled;
        self
    }

    pub fn max_history(mut self, max_history: usize) -> Self {
        self.config.max_history = max_history;
        self.memory_config.working_capacity = max_history;
        self
    }

    pub fn memory_config(mut self, config: MemoryConfig) -> Self {
        self.memory_config = config;
        self
    }

    pub fn recall_top_k(mut self, top_k: usize) -> Self {
        self.config.recall_top_k = top_k;
        self
    }

    pub fn cache(mut self, enabled: bool, ttl: Duration) -> Self {
        self.dispatcher_settings.cache_enabled = enabled;
        self.dispatcher_settings.cache_ttl = ttl;
        self
    }

    pub fn cache_allow_nondeterministic(mut self, allow: bool) -> Self {
        self.dispatcher_settings.cache_allow_nondeterministic = allow;
        self
    }

    pub fn retry(mut self, max_attempts: u32, base_delay: Duration, exponential_backoff: bool) -> Self {
        self.dispatcher_settings.retry_max_attempts = max_attempts;
        self.dispatcher_settings.retry_base_delay = base_delay;
        self.dispatcher_settings.retry_exponential_backoff = exponential_backoff;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn react(mut self, enabled: bool) -> Self {
        self.config.react_enabled = enabled;
        self
    }

    pub fn react_config(mut self, config: ReActConfig) -> Self {
        self.react_config = config;
        self
    }

    pub fn react_examples(mut self, examples: Vec<ReActExample>) -> Self {
        self.react_examples = examples;
        self
    }

    pub fn planner_config(mut self, config: PlannerConfig) -> Self {
        self.planner_config = config;
        self
    }

    pub fn auto_execute_tools(mut self, enabled: bool) -> Self {
        self.config.auto_execute_tools = enabled;
        self
    }

    pub fn max_tool_rounds(mut self, rounds: u32) -> Self {
        self.config.max_tool_rounds = rounds;
        self
    }

    pub fn max_parallel_tools(mut self, max_parallel: usize) -> Self {
        self.config.max_parallel_tools = max_parallel;
        self
    }

    /// Register callbacks invoked around each tool-loop round, replacing the
    /// default no-op implementation.
    pub fn tool_loop_callbacks(mut self, callbacks: Arc<dyn ToolLoopCallbacks>) -> Self {
        self.tool_loop_callbacks = Some(callbacks);
        self
    }

    /// Register callbacks invoked around each ReAct iteration, replacing the
    /// default no-op implementation.
    pub fn react_callbacks(mut self, callbacks: Arc<dyn ReActCallbacks>) -> Self {
        self.react_callbacks = Some(callbacks);
        self
    }

    /// Register callbacks invoked per streaming chunk in [`Agent::stream`].
    pub fn stream_callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.stream_callbacks = Some(callbacks);
        self
    }

    /// Assemble the configured [`Agent`]. Fails with `API_KEY_MISSING` if no
    /// custom provider was supplied and no API key was configured.
    pub fn build(self) -> Result<Agent> {
        let provider = match self.provider {
            Some(provider) => provider,
            None => {
                let api_key = self
                    .api_key
                    .ok_or_else(|| Error::api_key_missing("no provider or api_key configured"))?;
                let model = if self.config.model.is_empty() {
                    "gpt-4o-mini".to_string()
                } else {
                    self.config.model.clone()
                };
                Arc::new(ChatCompletionsProvider::new(self.base_url, api_key, model)?)
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(provider.clone(), &self.dispatcher_settings));
        let memory = if self.config.memory_enabled {
            Some(Arc::new(HierarchicalMemory::new(self.memory_config)))
        } else {
            None
        };

        Ok(Agent {
            dispatcher,
            provider,
            config: self.config,
            tools: Arc::new(self.tools),
            memory,
            react_config: self.react_config,
            react_examples: self.react_examples,
            planner_config: self.planner_config,
            tool_loop_callbacks: self.tool_loop_callbacks.unwrap_or_else(|| Arc::new(NoopToolLoopCallbacks)),
            react_callbacks: self.react_callbacks.unwrap_or_else(|| Arc::new(NoopReActCallbacks)),
            stream_callbacks: self.stream_callbacks.unwrap_or_else(|| Arc::new(NoopStreamCallbacks)),
        })
    }
}

/// Outcome of [`Agent::ask`]: the final text plus whichever execution mode
/// produced it (priority routing).
pub struct AskResponse {
    pub content: String,
    pub react_result: Option<ReActResult>,
    pub tool_rounds: Option<u32>,
}

/// A fully configured agent, ready to dispatch turns.
pub struct Agent {
    dispatcher: Arc<Dispatcher>,
    provider: Arc<dyn LlmProvider>,
    config: BuilderConfig,
    tools: Arc<ToolRegistry>,
    memory: Option<Arc<HierarchicalMemory>>,
    react_config: ReActConfig,
    react_examples: Vec<ReActExample>,
    planner_config: PlannerConfig,
    tool_loop_callbacks: Arc<dyn ToolLoopCallbacks>,
    react_callbacks: Arc<dyn ReActCallbacks>,
    stream_callbacks: Arc<dyn StreamCallbacks>,
}

impl Agent {
    fn system_prompt(&self) -> Option<String> {
        let persona = self.config.persona.as_ref().map(|p| p.system_prompt.as_str());
        let configured = self.config.system.as_deref();
        match (persona, configured) {
            (Some(p), Some(c)) => Some(format!("{p}\n\n{c}")),
            (Some(p), None) => Some(p.to_string()),
            (None, Some(c)) => Some(c.to_string()),
            (None, None) => None,
        }
    }

    async fn memory_messages(&self, user_turn: &str) -> Result<Vec<Message>> {
        match &self.memory {
            Some(memory) => memory.assemble_context(user_turn, self.config.recall_top_k).await,
            None => Ok(Vec::new()),
        }
    }

    fn base_request(&self, messages: Vec<Message>) -> CompletionRequest {
        let model = if self.config.model.is_empty() {
            self.provider.default_model().to_string()
        } else {
            self.config.model.clone()
        };

        let tool_definitions: Vec<ToolDefinition> = self.tools.definitions();

        CompletionRequest {
            model,
            messages,
            system: self.system_prompt(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
            stop: self.config.stop.clone(),
            tools: if tool_definitions.is_empty() { None } else { Some(tool_definitions) },
            tool_choice: self.config.tool_choice.clone(),
            response_format: self.config.response_format.clone(),
            seed: self.config.seed,
            presence_penalty: self.config.presence_penalty,
            frequency_penalty: self.config.frequency_penalty,
            logprobs: self.config.logprobs,
            n: self.config.n,
        }
    }

    /// Assemble a request from persona + memory + the new user turn and
    /// dispatch it through ReAct, the tool loop, or a single shot, in that
    /// priority order. Planner mode is reached via [`Agent::execute_plan`]
    /// instead, since it operates over a [`Plan`] rather than a single user
    /// turn.
    pub async fn ask(&self, user_turn: &str) -> Result<AskResponse> {
        self.ask_with_context(user_turn, &self.dispatch_context()).await
    }

    /// Same as [`Agent::ask`], but lets the caller supply the
    /// [`DispatchContext`] (and thereby its [`CancellationSignal`]) instead of
    /// one derived from the builder's configured timeout.
    pub async fn ask_with_context(&self, user_turn: &str, ctx: &DispatchContext) -> Result<AskResponse> {
        let mut messages = self.memory_messages(user_turn).await?;
        messages.push(Message::user(user_turn));

        if let Some(memory) = &self.memory {
            memory.add_message(Message::user(user_turn)).await?;
        }

        if self.config.react_enabled {
            let result = react::run_react(
                self.provider.as_ref(),
                &self.tools,
                user_turn,
                &self.react_examples,
                &self.react_config,
                self.react_callbacks.as_ref(),
                ctx,
            )
            .await?;

            if let Some(memory) = &self.memory {
                memory.add_message(Message::assistant(&result.answer)).await?;
            }

            return Ok(AskResponse {
                content: result.answer.clone(),
                react_result: Some(result),
                tool_rounds: None,
            });
        }

        let request = self.base_request(messages);

        if self.config.auto_execute_tools && self.tools.count() > 0 {
            let config = ToolLoopConfig {
                max_tool_rounds: self.config.max_tool_rounds,
                max_parallel_tools: self.config.max_parallel_tools,
            };
            let output = toolloop::run_tool_loop(
                self.provider.as_ref(),
                request,
                self.tools.clone(),
                &config,
                self.tool_loop_callbacks.as_ref(),
                ctx,
            )
            .await?;

            let content = output.response.message().map(|m| m.content.clone()).unwrap_or_default();
            if let Some(memory) = &self.memory {
                memory.add_message(Message::assistant(&content)).await?;
            }

            return Ok(AskResponse {
                content,
                react_result: None,
                tool_rounds: Some(output.rounds),
            });
        }

        let response = self.dispatcher.dispatch(&request, ctx).await?;
        let content = response.message().map(|m| m.content.clone()).unwrap_or_default();

        if let Some(memory) = &self.memory {
            memory.add_message(Message::assistant(&content)).await?;
        }

        Ok(AskResponse {
            content,
            react_result: None,
            tool_rounds: None,
        })
    }

    /// Execute a [`Plan`] via the Planner/Executor. The highest-priority
    /// execution mode; takes a [`Plan`] directly rather than a user turn.
    pub async fn execute_plan(&self, plan: Plan) -> Result<PlanOutput> {
        self.execute_plan_with_context(plan, &self.dispatch_context()).await
    }

    /// Same as [`Agent::execute_plan`], but lets the caller supply the
    /// [`DispatchContext`] directly.
    pub async fn execute_plan_with_context(&self, plan: Plan, ctx: &DispatchContext) -> Result<PlanOutput> {
        let executor = PlanExecutor::new(self.dispatcher.clone(), self.planner_config.clone());
        executor.run(plan, ctx).await
    }

    /// Open a streaming completion for `user_turn`, invoking the configured
    /// [`StreamCallbacks`] for each chunk as it arrives and returning the
    /// assembled final response once the stream ends.
    pub async fn stream(&self, user_turn: &str) -> Result<CompletionResponse> {
        let mut messages = self.memory_messages(user_turn).await?;
        messages.push(Message::user(user_turn));

        if let Some(memory) = &self.memory {
            memory.add_message(Message::user(user_turn)).await?;
        }

        let request = self.base_request(messages);
        let ctx = self.dispatch_context();
        let mut chunk_stream = self.dispatcher.dispatch_stream(&request, &ctx).await?;

        let mut content = String::new();
        let mut finish_reason: Option<FinishReason> = None;
        let mut id = String::new();

        while let Some(chunk) = chunk_stream.next().await {
            let chunk = chunk?;
            self.stream_callbacks.on_chunk(&chunk).await;
            if !chunk.id.is_empty() {
                id = chunk.id.clone();
            }
            content.push_str(&chunk.delta);
            if let Some(reason) = &chunk.finish_reason {
                finish_reason = Some(parse_finish_reason(reason));
            }
        }

        if let Some(memory) = &self.memory {
            memory.add_message(Message::assistant(&content)).await?;
        }

        Ok(CompletionResponse {
            id,
            model: request.model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason,
            }],
            usage: None,
        })
    }

    fn dispatch_context(&self) -> DispatchContext {
        match self.config.timeout {
            Some(timeout) => DispatchContext::with_timeout(timeout),
            None => DispatchContext::default(),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn memory(&self) -> Option<&Arc<HierarchicalMemory>> {
        self.memory.as_ref()
    }
}

/// Maps a provider's raw `finish_reason` string into the normalized enum,
/// falling back to `Stop` for unrecognized values rather than erroring.
fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        "tool_calls" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

struct NoopToolLoopCallbacks;
#[async_trait::async_trait]
impl ToolLoopCallbacks for NoopToolLoopCallbacks {}

struct NoopReActCallbacks;
#[async_trait::async_trait]
impl ReActCallbacks for NoopReActCallbacks {}

/// Optional hook invoked for each chunk of a [`Agent::stream`] response.
#[async_trait::async_trait]
pub trait StreamCallbacks: Send + Sync {
    async fn on_chunk(&self, _chunk: &StreamingChunk) {}
}

struct NoopStreamCallbacks;
#[async_trait::async_trait]
impl StreamCallbacks for NoopStreamCallbacks {}
