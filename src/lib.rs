//! # AgentCore
//!
//! A request-orchestration core for LLM-backed agents.
//!
//! ## Architecture
//!
//! - **Core types** (`core`): Provider trait, messages, completion requests/responses
//! - **Tools** (`tools`): Tool trait, registry, JSON-Schema-described parameters
//! - **Cache** (`cache`): Pluggable response/embedding cache backend
//! - **Builder/Dispatcher** (`builder`): Fluent configuration and the logging → cache →
//!   retry → provider request pipeline
//! - **Tool loop** (`toolloop`): Bounded-parallel tool-calling round loop with panic isolation
//! - **ReAct** (`react`): Reason-Act-Observe loop with tiered response parsing
//! - **Planner** (`planner`): DAG task planning and sequential/parallel/adaptive execution
//! - **Memory** (`memory`): Working/episodic/semantic hierarchical memory with compression
//! - **Config** (`config`): Modular configuration loading and validation
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agentcore::builder::AgentBuilder;
//! use agentcore::Result;
//!
//! # async fn run() -> Result<()> {
//! let agent = AgentBuilder::interactive()
//!     .api_key(std::env::var("LLM_API_KEY").unwrap_or_default())
//!     .build()?;
//! let _ = agent;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod tools;
pub mod cache;
pub mod builder;
pub mod toolloop;
pub mod react;
pub mod planner;
pub mod memory;
#[path = "config/mod.rs"]
pub mod config;
pub mod error;

pub use error::{Error, ErrorKind, Result};

pub use core::{
    CompletionRequest, CompletionResponse, LlmProvider, LlmStream, Message, Role, StreamingChunk,
    ToolCall, ToolDefinition,
};

pub use builder::{Agent, AgentBuilder, AskResponse, Persona};

/// Crate version, from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, from Cargo.toml.
pub const NAME: &str = env!("CARGO_PKG_NAME");
