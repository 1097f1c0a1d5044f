//! Error taxonomy for AgentCore.
//!
//! Every error carries a stable [`ErrorKind`] so callers can classify
//! failures (retryable? a tool problem? a plan problem?) without matching on
//! message text, plus a free-form context map for operation/attempt/tool-name
//! annotations that propagate through dispatcher, tool-loop, ReAct, and
//! planner layers.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias using AgentCore's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, matchable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ApiKeyMissing,
    RateLimitExceeded,
    RequestTimeout,
    NetworkError,
    InvalidRequest,
    ContentRefused,
    InvalidResponse,
    ToolNotFound,
    ToolExecutionFailed,
    ToolPanic,
    ParseFailure,
    MaxIterationsReached,
    MaxToolRoundsReached,
    MaxRetriesExceeded,
    InvalidPlan,
    ContextCancelled,
    CacheError,
    MemoryFull,
    Internal,
}

impl ErrorKind {
    /// Whether errors of this kind are safe to retry automatically.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimitExceeded | ErrorKind::RequestTimeout | ErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::ApiKeyMissing => "API_KEY_MISSING",
            ErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorKind::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::ContentRefused => "CONTENT_REFUSED",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorKind::ToolExecutionFailed => "TOOL_EXECUTION_FAILED",
            ErrorKind::ToolPanic => "TOOL_PANIC",
            ErrorKind::ParseFailure => "PARSE_FAILURE",
            ErrorKind::MaxIterationsReached => "MAX_ITERATIONS_REACHED",
            ErrorKind::MaxToolRoundsReached => "MAX_TOOL_ROUNDS_REACHED",
            ErrorKind::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorKind::InvalidPlan => "INVALID_PLAN",
            ErrorKind::ContextCancelled => "CONTEXT_CANCELLED",
            ErrorKind::CacheError => "CACHE_ERROR",
            ErrorKind::MemoryFull => "MEMORY_FULL",
            ErrorKind::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// Main error type for AgentCore.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub context: HashMap<String, String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build a new error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
            context: HashMap::new(),
            source: None,
        }
    }

    /// Attach a context field, builder-style.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Attach an underlying source error, builder-style.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn api_key_missing(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::ApiKeyMissing, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::RateLimitExceeded, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::RequestTimeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::NetworkError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidRequest, message)
    }

    pub fn content_refused(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::ContentRefused, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidResponse, message)
    }

    pub fn tool_not_found(name: impl Into<String>) -> Self {
        let name = name.into();
        Error::new(ErrorKind::ToolNotFound, format!("unknown tool: {name}"))
            .with_context("tool", name)
    }

    pub fn tool_execution_failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        let name = name.into();
        Error::new(ErrorKind::ToolExecutionFailed, message).with_context("tool", name)
    }

    pub fn tool_panic(name: impl Into<String>, payload: impl Into<String>) -> Self {
        let name = name.into();
        Error::new(ErrorKind::ToolPanic, payload).with_context("tool", name)
    }

    pub fn parse_failure(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::ParseFailure, message)
    }

    pub fn max_iterations(limit: u32) -> Self {
        Error::new(
            ErrorKind::MaxIterationsReached,
            format!("reached max iterations ({limit})"),
        )
        .with_context("limit", limit.to_string())
    }

    pub fn max_tool_rounds(limit: u32) -> Self {
        Error::new(
            ErrorKind::MaxToolRoundsReached,
            format!("reached max tool rounds ({limit})"),
        )
        .with_context("limit", limit.to_string())
    }

    pub fn max_retries(attempts: u32) -> Self {
        Error::new(
            ErrorKind::MaxRetriesExceeded,
            format!("exhausted retries after {attempts} attempts"),
        )
        .with_context("attempts", attempts.to_string())
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidPlan, message)
    }

    pub fn cancelled() -> Self {
        Error::new(ErrorKind::ContextCancelled, "context cancelled")
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::CacheError, message)
    }

    pub fn memory_full(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::MemoryFull, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Internal, message)
    }

    /// Whether this error is safe to retry.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether this error reflects the caller's fault rather than a runtime
    /// or provider failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::InvalidRequest | ErrorKind::ToolNotFound | ErrorKind::InvalidPlan
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::timeout(err.to_string())
        } else {
            Error::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::InvalidResponse, err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Internal, err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::new(ErrorKind::InvalidRequest, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(Error::rate_limit("x").is_retryable());
        assert!(Error::timeout("x").is_retryable());
        assert!(Error::network("x").is_retryable());
        assert!(!Error::invalid_request("x").is_retryable());
        assert!(!Error::tool_not_found("foo").is_retryable());
    }

    #[test]
    fn client_errors() {
        assert!(Error::invalid_request("bad").is_client_error());
        assert!(Error::tool_not_found("x").is_client_error());
        assert!(!Error::rate_limit("x").is_client_error());
    }

    #[test]
    fn context_round_trips() {
        let err = Error::tool_execution_failed("add", "boom");
        assert_eq!(err.context.get("tool").map(String::as_str), Some("add"));
        assert_eq!(err.kind, ErrorKind::ToolExecutionFailed);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::max_iterations(5);
        let s = err.to_string();
        assert!(s.contains("MAX_ITERATIONS_REACHED"));
        assert!(s.contains('5'));
    }
}
