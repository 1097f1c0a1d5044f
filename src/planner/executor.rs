//! Plan execution under the Sequential, Parallel, and Adaptive strategies:
//! level-batched execution following a "collect ready ids → take up to
//! `MaxParallel` → execute batch → mark completed → loop" shape.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::builder::dispatcher::{DispatchContext, Dispatcher};
use crate::core::{CompletionRequest, Message, TimelineEvent};
use crate::error::Result;

use super::dag::{self, levels as compute_levels};
use super::types::{Plan, Strategy, Task, TaskStatus};

/// Tuning knobs for [`PlanExecutor`] (defaults).
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub model: String,
    pub max_parallel: usize,
    pub adaptive_threshold: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            model: "default".into(),
            max_parallel: 5,
            adaptive_threshold: 0.5,
        }
    }
}

/// Aggregate metrics over a completed plan run.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanMetrics {
    pub task_count: usize,
    pub success_rate: f64,
    pub total_duration: Duration,
    pub avg_task_duration: Duration,
}

/// Result of [`PlanExecutor::run`].
#[derive(Debug, Clone)]
pub struct PlanOutput {
    pub plan: Plan,
    pub metrics: PlanMetrics,
    pub timeline: Vec<TimelineEvent>,
}

/// Executes a validated [`Plan`] by dispatching each task through the
/// standard [`Dispatcher`] pipeline.
pub struct PlanExecutor {
    dispatcher: Arc<Dispatcher>,
    config: PlannerConfig,
}

struct RunState {
    start: Instant,
    timeline: Vec<TimelineEvent>,
    task_durations: Vec<Duration>,
}

impl RunState {
    fn new(start: Instant) -> Self {
        RunState {
            start,
            timeline: Vec::new(),
            task_durations: Vec::new(),
        }
    }

    fn record(&mut self, event_type: impl Into<String>, description: impl Into<String>) {
        self.timeline.push(TimelineEvent {
            timestamp_millis: self.start.elapsed().as_millis() as u64,
            event_type: event_type.into(),
            description: description.into(),
        });
    }
}

impl PlanExecutor {
    pub fn new(dispatcher: Arc<Dispatcher>, config: PlannerConfig) -> Self {
        PlanExecutor { dispatcher, config }
    }

    /// Runs `plan` to completion, checking `ctx` for cancellation between
    /// levels. A cancelled context marks every still-`Pending` task
    /// `Skipped` and returns the partial result rather than erroring, since
    /// completed/failed tasks up to that point remain meaningful.
    pub async fn run(&self, mut plan: Plan, ctx: &DispatchContext) -> Result<PlanOutput> {
        dag::validate(&plan)?;
        let start = Instant::now();
        let mut state = RunState::new(start);

        if plan.tasks.is_empty() {
            return Ok(PlanOutput {
                plan,
                metrics: PlanMetrics {
                    task_count: 0,
                    success_rate: 1.0,
                    total_duration: start.elapsed(),
                    avg_task_duration: Duration::ZERO,
                },
                timeline: state.timeline,
            });
        }

        let levels = compute_levels(&plan)?;

        match plan.strategy {
            Strategy::Sequential => self.run_sequential(&mut plan, &levels, &mut state, ctx).await,
            Strategy::Parallel => self.run_parallel(&mut plan, &levels, &mut state, ctx).await,
            Strategy::Adaptive => self.run_adaptive(&mut plan, &levels, &mut state, ctx).await,
        }

        let total_duration = start.elapsed();
        let avg_task_duration = if state.task_durations.is_empty() {
            Duration::ZERO
        } else {
            state.task_durations.iter().sum::<Duration>() / state.task_durations.len() as u32
        };

        Ok(PlanOutput {
            metrics: PlanMetrics {
                task_count: plan.tasks.len(),
                success_rate: plan.success_rate(),
                total_duration,
                avg_task_duration,
            },
            plan,
            timeline: state.timeline,
        })
    }

    async fn run_sequential(&self, plan: &mut Plan, levels: &[Vec<String>], state: &mut RunState, ctx: &DispatchContext) {
        for level in levels {
            if self.bail_if_cancelled(plan, state, ctx) {
                return;
            }
            self.execute_level_with_concurrency(plan, level, 1, state, ctx).await;
        }
    }

    async fn run_parallel(&self, plan: &mut Plan, levels: &[Vec<String>], state: &mut RunState, ctx: &DispatchContext) {
        for level in levels {
            if self.bail_if_cancelled(plan, state, ctx) {
                return;
            }
            self.execute_level_with_concurrency(plan, level, self.config.max_parallel, state, ctx)
                .await;
        }
    }

    /// Starts sequential; after each level, compares observed parallel
    /// efficiency against `AdaptiveThreshold` (averaged over up to the last
    /// two levels to damp single-sample noise) and switches mode with a
    /// one-level dwell time to avoid oscillation.
    async fn run_adaptive(&self, plan: &mut Plan, levels: &[Vec<String>], state: &mut RunState, ctx: &DispatchContext) {
        let mut parallel_mode = false;
        let mut efficiency_window: Vec<f64> = Vec::new();
        let mut dwell: u32 = 0;

        for level in levels {
            if self.bail_if_cancelled(plan, state, ctx) {
                return;
            }
            let concurrency = if parallel_mode { self.config.max_parallel } else { 1 };
            let level_start = Instant::now();
            self.execute_level_with_concurrency(plan, level, concurrency, state, ctx).await;
            let wall_clock = level_start.elapsed();

            let task_durations_this_level: Duration = level
                .iter()
                .filter_map(|id| plan.task(id))
                .filter(|t| t.status == TaskStatus::Completed || t.status == TaskStatus::Failed)
                .count() as u32
                * (wall_clock / level.len().max(1) as u32);
            let efficiency = if wall_clock.as_secs_f64() > 0.0 {
                task_durations_this_level.as_secs_f64() / (wall_clock.as_secs_f64() * concurrency as f64)
            } else {
                1.0
            };

            efficiency_window.push(efficiency);
            if efficiency_window.len() > 2 {
                efficiency_window.remove(0);
            }
            let avg_efficiency = efficiency_window.iter().sum::<f64>() / efficiency_window.len() as f64;

            if dwell > 0 {
                dwell -= 1;
                continue;
            }

            if !parallel_mode && level.len() >= 2 && avg_efficiency >= self.config.adaptive_threshold {
                parallel_mode = true;
                dwell = 1;
                state.record(
                    "strategy_switched",
                    format!("sequential -> parallel (efficiency={avg_efficiency:.2})"),
                );
            } else if parallel_mode && avg_efficiency < self.config.adaptive_threshold {
                parallel_mode = false;
                dwell = 1;
                state.record(
                    "strategy_switched",
                    format!("parallel -> sequential (efficiency={avg_efficiency:.2})"),
                );
            }
        }
    }

    /// If `ctx` is cancelled, marks every still-pending task `Skipped` and
    /// records it on the timeline. Returns whether the caller should stop.
    fn bail_if_cancelled(&self, plan: &mut Plan, state: &mut RunState, ctx: &DispatchContext) -> bool {
        if !ctx.cancellation.is_cancelled() {
            return false;
        }
        for task in &mut plan.tasks {
            if task.status == TaskStatus::Pending {
                task.status = TaskStatus::Skipped;
            }
        }
        state.record("plan_cancelled", "cancellation requested; remaining tasks skipped");
        true
    }

    /// Execute every runnable task in `level` with at most `concurrency`
    /// tasks in flight at once, marking unreachable descendants `skipped`
    /// once failures in this level are known.
    async fn execute_level_with_concurrency(
        &self,
        plan: &mut Plan,
        level: &[String],
        concurrency: usize,
        state: &mut RunState,
        ctx: &DispatchContext,
    ) {
        let runnable: Vec<String> = level
            .iter()
            .filter(|id| plan.task(id).map(|t| t.status == TaskStatus::Pending).unwrap_or(false))
            .cloned()
            .collect();

        if runnable.is_empty() {
            for id in level {
                if let Some(task) = plan.task_mut(id) {
                    if task.status == TaskStatus::Pending {
                        task.status = TaskStatus::Skipped;
                    }
                }
            }
            return;
        }

        for id in &runnable {
            state.record("task_started", format!("task '{id}' started"));
            if let Some(task) = plan.task_mut(id) {
                task.status = TaskStatus::Running;
            }
        }

        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut joins = JoinSet::new();

        for id in runnable {
            let task = plan.task(&id).expect("runnable id resolves to a task").clone();
            let dependency_summaries = self.dependency_summaries(plan, &task);
            let dispatcher = self.dispatcher.clone();
            let model = self.config.model.clone();
            let permit = semaphore.clone();
            let ctx = ctx.clone();

            joins.spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let start = Instant::now();
                let result = Self::execute_task(&dispatcher, &model, &task, &dependency_summaries, &ctx).await;
                (task.id, result, start.elapsed())
            });
        }

        let mut completed_ids = Vec::new();
        let mut failed_ids = Vec::new();

        while let Some(joined) = joins.join_next().await {
            let (id, result, duration) = joined.expect("task execution task does not panic");
            state.task_durations.push(duration);

            match result {
                Ok(content) => {
                    if let Some(task) = plan.task_mut(&id) {
                        task.status = TaskStatus::Completed;
                        task.result = Some(content);
                    }
                    completed_ids.push(id.clone());
                    state.record("task_completed", format!("task '{id}' completed"));
                }
                Err(err) => {
                    if let Some(task) = plan.task_mut(&id) {
                        task.status = TaskStatus::Failed;
                        task.error = Some(err.message.clone());
                    }
                    failed_ids.push(id.clone());
                    warn!(task = %id, error = %err, "plan task failed");
                    state.record("task_failed", format!("task '{id}' failed: {}", err.message));
                }
            }
        }

        if !failed_ids.is_empty() {
            self.propagate_skips(plan, &failed_ids, state);
        }
    }

    /// Mark every task transitively depending on a failed task `Skipped`.
    fn propagate_skips(&self, plan: &mut Plan, failed_ids: &[String], state: &mut RunState) {
        let mut unreachable: std::collections::HashSet<String> = failed_ids.iter().cloned().collect();
        loop {
            let mut grew = false;
            for task in &plan.tasks {
                if task.status != TaskStatus::Pending {
                    continue;
                }
                if task.dependencies.iter().any(|dep| unreachable.contains(dep)) && unreachable.insert(task.id.clone())
                {
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        for id in unreachable {
            if let Some(task) = plan.task_mut(&id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::Skipped;
                    state.record("task_skipped", format!("task '{id}' skipped (ancestor failed)"));
                }
            }
        }
    }

    fn dependency_summaries(&self, plan: &Plan, task: &Task) -> String {
        if task.dependencies.is_empty() {
            return String::new();
        }
        task.dependencies
            .iter()
            .filter_map(|dep| plan.task(dep))
            .map(|dep| format!("{}: {}", dep.id, dep.result.clone().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn execute_task(
        dispatcher: &Dispatcher,
        model: &str,
        task: &Task,
        dependency_summaries: &str,
        ctx: &DispatchContext,
    ) -> Result<String> {
        let prompt = if dependency_summaries.is_empty() {
            task.description.clone()
        } else {
            format!("{}\n\nContext from prior tasks:\n{dependency_summaries}", task.description)
        };

        info!(task = %task.id, "dispatching plan task");
        let request = CompletionRequest::new(model, vec![Message::user(prompt)]);
        let response = dispatcher.dispatch(&request, ctx).await?;
        Ok(response.message().map(|m| m.content.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::dispatcher::DispatcherSettings;
    use crate::core::{Choice, CompletionResponse, FinishReason, LlmProvider, ProviderMeta};
    use crate::error::Error;
    use crate::planner::types::TaskType;
    use async_trait::async_trait;

    struct ScriptedProvider {
        meta: ProviderMeta,
        fail_on: Vec<String>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn meta(&self) -> &ProviderMeta {
            &self.meta
        }
        fn default_model(&self) -> &str {
            "plan-model"
        }
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
            let prompt = request.messages.first().map(|m| m.content.as_str()).unwrap_or_default();
            if self.fail_on.iter().any(|marker| prompt.contains(marker.as_str())) {
                return Err(Error::invalid_request("scripted failure"));
            }
            Ok(CompletionResponse {
                id: "resp".into(),
                model: "plan-model".into(),
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

    fn executor(fail_on: Vec<&str>) -> PlanExecutor {
        let provider = Arc::new(ScriptedProvider {
            meta: ProviderMeta {
                id: "scripted".into(),
                name: "scripted".into(),
                base_url: String::new(),
                supports_streaming: false,
                supports_tools: false,
            },
            fail_on: fail_on.into_iter().map(String::from).collect(),
        });
        let dispatcher = Arc::new(Dispatcher::new(provider, &DispatcherSettings::default()));
        PlanExecutor::new(dispatcher, PlannerConfig::default())
    }

    fn task(id: &str, deps: &[&str]) -> Task {
        Task::new(id, format!("do {id}"), TaskType::Action).depends_on(deps.to_vec())
    }

    #[tokio::test]
    async fn empty_plan_succeeds_immediately() {
        let plan = Plan::new("p", Strategy::Sequential, vec![]);
        let output = executor(vec![]).run(plan, &DispatchContext::default()).await.unwrap();
        assert_eq!(output.metrics.task_count, 0);
        assert_eq!(output.metrics.success_rate, 1.0);
        assert!(output.timeline.is_empty());
    }

    #[tokio::test]
    async fn sequential_executes_every_task() {
        let plan = Plan::new("p", Strategy::Sequential, vec![task("a", &[]), task("b", &["a"])]);
        let output = executor(vec![]).run(plan, &DispatchContext::default()).await.unwrap();
        assert_eq!(output.metrics.success_rate, 1.0);
        assert!(output.plan.is_complete());
    }

    #[tokio::test]
    async fn failure_propagates_skip_to_descendants() {
        // A, B(dep A), C(dep A), D(dep B, C); A fails.
        let plan = Plan::new(
            "p",
            Strategy::Parallel,
            vec![task("a", &[]), task("b", &["a"]), task("c", &["a"]), task("d", &["b", "c"])],
        );
        let output = executor(vec!["do a"]).run(plan, &DispatchContext::default()).await.unwrap();

        assert_eq!(output.plan.task("a").unwrap().status, TaskStatus::Failed);
        assert_eq!(output.plan.task("b").unwrap().status, TaskStatus::Skipped);
        assert_eq!(output.plan.task("c").unwrap().status, TaskStatus::Skipped);
        assert_eq!(output.plan.task("d").unwrap().status, TaskStatus::Skipped);
        assert_eq!(output.metrics.success_rate, 0.0);
    }

    #[tokio::test]
    async fn parallel_runs_independent_level_to_completion_despite_one_failure() {
        let plan = Plan::new(
            "p",
            Strategy::Parallel,
            vec![task("a", &[]), task("b", &[]), task("c", &[])],
        );
        let output = executor(vec!["do b"]).run(plan, &DispatchContext::default()).await.unwrap();

        assert_eq!(output.plan.task("a").unwrap().status, TaskStatus::Completed);
        assert_eq!(output.plan.task("b").unwrap().status, TaskStatus::Failed);
        assert_eq!(output.plan.task("c").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn max_parallel_one_matches_sequential_outcome() {
        let plan = Plan::new(
            "p",
            Strategy::Parallel,
            vec![task("a", &[]), task("b", &["a"])],
        );
        let executor = PlanExecutor::new(
            Arc::new(Dispatcher::new(
                Arc::new(ScriptedProvider {
                    meta: ProviderMeta {
                        id: "s".into(),
                        name: "s".into(),
                        base_url: String::new(),
                        supports_streaming: false,
                        supports_tools: false,
                    },
                    fail_on: vec![],
                }),
                &DispatcherSettings::default(),
            )),
            PlannerConfig {
                max_parallel: 1,
                ..PlannerConfig::default()
            },
        );
        let output = executor.run(plan, &DispatchContext::default()).await.unwrap();
        assert_eq!(output.metrics.success_rate, 1.0);
    }

    #[tokio::test]
    async fn adaptive_strategy_completes_successfully() {
        let plan = Plan::new(
            "p",
            Strategy::Adaptive,
            vec![task("a", &[]), task("b", &[]), task("c", &["a", "b"])],
        );
        let output = executor(vec![]).run(plan, &DispatchContext::default()).await.unwrap();
        assert!(output.plan.is_complete());
        assert_eq!(output.metrics.success_rate, 1.0);
    }

    #[tokio::test]
    async fn cancelled_context_skips_remaining_levels() {
        let plan = Plan::new("p", Strategy::Sequential, vec![task("a", &[]), task("b", &["a"])]);
        let ctx = DispatchContext::default();
        ctx.cancellation.cancel();
        let output = executor(vec![]).run(plan, &ctx).await.unwrap();

        assert_eq!(output.plan.task("a").unwrap().status, TaskStatus::Skipped);
        assert_eq!(output.plan.task("b").unwrap().status, TaskStatus::Skipped);
    }
}
