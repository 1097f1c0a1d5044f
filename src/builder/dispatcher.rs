//! The dispatch pipeline: logging → cache → retry → provider,
//! each layer transparent on success and preserving/annotating errors on
//! failure. Each layer implements one internal [`Dispatch`] trait and wraps
//! the next, instead of one monolithic client method.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cache::{hash_key, InMemoryCache};
use crate::core::{CompletionRequest, CompletionResponse, LlmProvider, LlmStream};
use crate::error::{Error, Result};

/// A cooperative cancellation flag threaded through every dispatch layer.
#[derive(Clone)]
pub struct CancellationSignal(Arc<CancellationInner>);

struct CancellationInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        CancellationSignal(Arc::new(CancellationInner {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }))
    }
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancelled; resolves immediately if already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.0.notify.notified().await;
    }
}

/// Per-dispatch context: optional overall deadline and a cancellation flag.
#[derive(Clone, Default)]
pub struct DispatchContext {
    pub timeout: Option<Duration>,
    pub cancellation: CancellationSignal,
}

impl DispatchContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        DispatchContext {
            timeout: Some(timeout),
            cancellation: CancellationSignal::new(),
        }
    }
}

/// Internal seam every dispatch layer implements, so layers compose by
/// wrapping one another rather than branching on which are enabled.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse>;
}

/// Calls `provider.complete`, honoring `ctx`'s timeout and cancellation
/// signal. Shared by [`ProviderDispatch`] and by the tool loop / ReAct loop,
/// which call a provider directly rather than through the full
/// cache/retry pipeline — so a single context still governs every call site
/// that can block on the network.
pub async fn complete_with_context(
    provider: &dyn LlmProvider,
    request: &CompletionRequest,
    ctx: &DispatchContext,
) -> Result<CompletionResponse> {
    if ctx.cancellation.is_cancelled() {
        return Err(Error::cancelled());
    }

    let call = provider.complete(request);
    let result = match ctx.timeout {
        Some(timeout) => tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(Error::cancelled()),
            timed = tokio::time::timeout(timeout, call) => match timed {
                Ok(inner) => inner,
                Err(_) => Err(Error::timeout(format!("provider call exceeded {timeout:?}"))),
            },
        },
        None => tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => return Err(Error::cancelled()),
            inner = call => inner,
        },
    };

    if ctx.cancellation.is_cancelled() {
        return Err(Error::cancelled());
    }
    result
}

/// Calls `provider.stream`, honoring `ctx`'s timeout and cancellation signal
/// the same way [`complete_with_context`] does for non-streaming calls.
pub async fn stream_with_context(
    provider: &dyn LlmProvider,
    request: &CompletionRequest,
    ctx: &DispatchContext,
) -> Result<LlmStream> {
    if ctx.cancellation.is_cancelled() {
        return Err(Error::cancelled());
    }

    let call = provider.stream(request);
    match ctx.timeout {
        Some(timeout) => tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(Error::cancelled()),
            timed = tokio::time::timeout(timeout, call) => match timed {
                Ok(inner) => inner,
                Err(_) => Err(Error::timeout(format!("provider stream call exceeded {timeout:?}"))),
            },
        },
        None => tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(Error::cancelled()),
            inner = call => inner,
        },
    }
}

/// Innermost layer: calls the provider, honoring the context's timeout and
/// cancellation.
pub struct ProviderDispatch {
    provider: Arc<dyn LlmProvider>,
}

impl ProviderDispatch {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        ProviderDispatch { provider }
    }
}

#[async_trait]
impl Dispatch for ProviderDispatch {
    async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse> {
        complete_with_context(self.provider.as_ref(), request, ctx).await
    }
}

/// Retry layer: only retryable errors are retried, on a
/// fixed or exponential-with-cap schedule. A cancelled context aborts
/// immediately rather than sleeping out the backoff.
pub struct RetryLayer<D> {
    inner: D,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_backoff: bool,
}

impl<D: Dispatch> RetryLayer<D> {
    pub fn new(inner: D, max_attempts: u32, base_delay: Duration, exponential_backoff: bool) -> Self {
        RetryLayer {
            inner,
            max_attempts,
            base_delay,
            max_delay: Duration::from_secs(30),
            exponential_backoff,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        if self.exponential_backoff {
            let mut policy = backoff::ExponentialBackoff {
                initial_interval: self.base_delay,
                max_interval: self.max_delay,
                randomization_factor: 0.0,
                multiplier: 2.0,
                max_elapsed_time: None,
                ..backoff::ExponentialBackoff::default()
            };
            policy.reset();
            let mut delay = self.base_delay;
            for _ in 0..attempt.max(1).min(16) {
                delay = backoff::backoff::Backoff::next_backoff(&mut policy).unwrap_or(self.max_delay);
            }
            delay.min(self.max_delay)
        } else {
            self.base_delay
        }
    }
}

#[async_trait]
impl<D: Dispatch + Send + Sync> Dispatch for RetryLayer<D> {
    async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse> {
        let mut attempt: u32 = 0;
        loop {
            if ctx.cancellation.is_cancelled() {
                return Err(Error::cancelled());
            }

            match self.inner.dispatch(request, ctx).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying dispatch");

                    tokio::select! {
                        biased;
                        _ = ctx.cancellation.cancelled() => return Err(Error::cancelled()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) if err.is_retryable() => {
                    return Err(Error::max_retries(attempt).with_context("last_error", err.message));
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A request's cache-equivalence key: two requests are equivalent iff their
/// normalized serialization (model, messages, system, deterministic
/// sampling params, tool signatures) is byte-identical. Non-deterministic
/// fields (request id, logger reference) don't exist on
/// [`CompletionRequest`] so nothing needs to be stripped.
fn cache_key(request: &CompletionRequest) -> u64 {
    #[derive(serde::Serialize)]
    struct KeyView<'a> {
        model: &'a str,
        messages: &'a [crate::core::Message],
        system: &'a Option<String>,
        max_tokens: Option<u32>,
        top_p: Option<f32>,
        stop: &'a Option<Vec<String>>,
        seed: Option<u64>,
        tool_names: Vec<&'a str>,
    }

    let tool_names = request
        .tools
        .as_ref()
        .map(|tools| {
            let mut names: Vec<&str> = tools.iter().map(|t| t.function.name.as_str()).collect();
            names.sort_unstable();
            names
        })
        .unwrap_or_default();

    let view = KeyView {
        model: &request.model,
        messages: &request.messages,
        system: &request.system,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        stop: &request.stop,
        seed: request.seed,
        tool_names,
    };

    let serialized = serde_json::to_string(&view).unwrap_or_default();
    hash_key(&serialized)
}

/// Response cache layer. Skips caching requests with
/// `temperature > 0` unless `allow_nondeterministic` is set, since a
/// non-deterministic request would poison the cache with a single sampled
/// response.
pub struct CacheLayer<D> {
    inner: D,
    cache: InMemoryCache<CompletionResponse>,
    ttl: Duration,
    allow_nondeterministic: bool,
}

impl<D: Dispatch> CacheLayer<D> {
    pub fn new(inner: D, max_capacity: u64, ttl: Duration, allow_nondeterministic: bool) -> Self {
        CacheLayer {
            inner,
            cache: InMemoryCache::new(max_capacity, ttl),
            ttl,
            allow_nondeterministic,
        }
    }
}

#[async_trait]
impl<D: Dispatch + Send + Sync> Dispatch for CacheLayer<D> {
    async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse> {
        let is_deterministic = request.temperature.map(|t| t <= 0.0).unwrap_or(true);
        if !is_deterministic && !self.allow_nondeterministic {
            return self.inner.dispatch(request, ctx).await;
        }

        let key = cache_key(request);
        if let Some(hit) = self.cache.get(key).await? {
            debug!(cache_key = key, "cache hit");
            return Ok(hit);
        }

        let response = self.inner.dispatch(request, ctx).await?;
        self.cache.put(key, response.clone(), self.ttl).await?;
        Ok(response)
    }
}

/// Outermost layer: structured request/response logging via `tracing`,
/// realized through the ambient subscriber rather than a bespoke
/// field-map logger type.
pub struct LoggingLayer<D> {
    inner: D,
}

impl<D: Dispatch> LoggingLayer<D> {
    pub fn new(inner: D) -> Self {
        LoggingLayer { inner }
    }
}

#[async_trait]
impl<D: Dispatch + Send + Sync> Dispatch for LoggingLayer<D> {
    async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse> {
        info!(model = %request.model, messages = request.messages.len(), "dispatching completion request");
        let result = self.inner.dispatch(request, ctx).await;
        match &result {
            Ok(response) => debug!(id = %response.id, "dispatch succeeded"),
            Err(err) => warn!(kind = %err.kind, error = %err.message, "dispatch failed"),
        }
        result
    }
}

/// Fully-assembled `logging(cache(retry(provider)))` pipeline.
///
/// Streaming calls bypass the cache/retry layers — a partially-consumed
/// stream can't be retried from the top without re-emitting chunks already
/// handed to the caller, and a stream of deltas isn't a cacheable value —
/// but still go through the same cancellation/timeout context as every
/// other dispatch.
pub struct Dispatcher {
    inner: LoggingLayer<CacheLayer<RetryLayer<ProviderDispatch>>>,
    provider: Arc<dyn LlmProvider>,
}

/// Dispatcher-layer tuning knobs, independent of the rest of [`super::BuilderConfig`].
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub cache_enabled: bool,
    pub cache_capacity: u64,
    pub cache_ttl: Duration,
    pub cache_allow_nondeterministic: bool,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_exponential_backoff: bool,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        DispatcherSettings {
            cache_enabled: false,
            cache_capacity: 1000,
            cache_ttl: Duration::from_secs(5 * 60),
            cache_allow_nondeterministic: false,
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(500),
            retry_exponential_backoff: true,
        }
    }
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: &DispatcherSettings) -> Self {
        let provider_layer = ProviderDispatch::new(provider.clone());
        let retry_layer = RetryLayer::new(
            provider_layer,
            settings.retry_max_attempts,
            settings.retry_base_delay,
            settings.retry_exponential_backoff,
        );
        // A disabled cache still wraps the retry layer but with capacity 0,
        // making every lookup a guaranteed miss — a no-op in practice
        // without special-casing dispatch().
        let cache_capacity = if settings.cache_enabled { settings.cache_capacity } else { 0 };
        let cache_layer = CacheLayer::new(
            retry_layer,
            cache_capacity,
            settings.cache_ttl,
            settings.cache_allow_nondeterministic,
        );
        Dispatcher {
            inner: LoggingLayer::new(cache_layer),
            provider,
        }
    }

    pub async fn dispatch(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<CompletionResponse> {
        self.inner.dispatch(request, ctx).await
    }

    /// Opens a streaming completion directly against the provider, skipping
    /// the cache/retry layers but still honoring `ctx`.
    pub async fn dispatch_stream(&self, request: &CompletionRequest, ctx: &DispatchContext) -> Result<LlmStream> {
        info!(model = %request.model, "dispatching streaming completion request");
        stream_with_context(self.provider.as_ref(), request, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Choice, FinishReason, Message, ProviderMeta};
    use std::sync::atomic::AtomicUsize;

    struct FlakyProvider {
        meta: ProviderMeta,
        fail_times: usize,
        calls: AtomicUsize,
    }

    impl FlakyProvider {
        fn new(fail_times: usize) -> Self {
            FlakyProvider {
                meta: ProviderMeta {
                    id: "flaky".into(),
                    name: "flaky".into(),
                    base_url: String::new(),
                    supports_streaming: false,
                    supports_tools: false,
                },
                fail_times,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }
        fn default_model(&self) -> &str {
            "flaky-model"
        }
        async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(Error::rate_limit("slow down"));
            }
            Ok(CompletionResponse {
                id: format!("resp-{call}"),
                model: "flaky-model".into(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant("ok"),
                    finish_reason: Some(FinishReason::Stop),
                }],
                usage: None,
            })
        }
        async fn stream(&self, _request: &CompletionRequest) -> Result<crate::core::LlmStream> {
            Err(Error::invalid_request("n/a"))
        }
    }

    fn request() -> CompletionRequest {
        CompletionRequest::new("flaky-model", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_errors() {
        let settings = DispatcherSettings {
            retry_base_delay: Duration::from_millis(1),
            ..DispatcherSettings::default()
        };
        let dispatcher = Dispatcher::new(Arc::new(FlakyProvider::new(2)), &settings);
        let response = dispatcher.dispatch(&request(), &DispatchContext::default()).await.unwrap();
        assert_eq!(response.message().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn retry_exhaustion_surfaces_max_retries() {
        let settings = DispatcherSettings {
            retry_max_attempts: 1,
            retry_base_delay: Duration::from_millis(1),
            ..DispatcherSettings::default()
        };
        let dispatcher = Dispatcher::new(Arc::new(FlakyProvider::new(5)), &settings);
        let err = dispatcher.dispatch(&request(), &DispatchContext::default()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::MaxRetriesExceeded);
    }

    #[tokio::test]
    async fn non_retryable_error_is_not_retried() {
        struct AlwaysInvalid(ProviderMeta);
        #[async_trait]
        impl LlmProvider for AlwaysInvalid {
            fn meta(&self) -> &ProviderMeta {
                &self.0
            }
            fn default_model(&self) -> &str {
                "x"
            }
            async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
                Err(Error::invalid_request("bad request"))
            }
            async fn stream(&self, _request: &CompletionRequest) -> Result<crate::core::LlmStream> {
                Err(Error::invalid_request("n/a"))
            }
        }
        let provider = AlwaysInvalid(ProviderMeta {
            id: "x".into(),
            name: "x".into(),
            base_url: String::new(),
            supports_streaming: false,
            supports_tools: false,
        });
        let dispatcher = Dispatcher::new(Arc::new(provider), &DispatcherSettings::default());
        let err = dispatcher.dispatch(&request(), &DispatchContext::default()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn cache_hit_returns_byte_equal_response_without_a_second_call() {
        let settings = DispatcherSettings {
            cache_enabled: true,
            ..DispatcherSettings::default()
        };
        let provider = Arc::new(FlakyProvider::new(0));
        let dispatcher = Dispatcher::new(provider.clone(), &settings);

        let first = dispatcher.dispatch(&request(), &DispatchContext::default()).await.unwrap();
        let second = dispatcher.dispatch(&request(), &DispatchContext::default()).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_retry() {
        let ctx = DispatchContext::default();
        ctx.cancellation.cancel();
        let dispatcher = Dispatcher::new(Arc::new(FlakyProvider::new(5)), &DispatcherSettings::default());
        let err = dispatcher.dispatch(&request(), &ctx).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ContextCancelled);
    }
}
