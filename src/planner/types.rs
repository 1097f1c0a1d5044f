//! Plan/Task data model.

use serde::{Deserialize, Serialize};

/// How a [`Plan`]'s tasks are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Sequential,
    Parallel,
    Adaptive,
}

/// The kind of work a [`Task`] represents. Informational — the executor
/// dispatches every kind the same way (an LLM request), but callers and
/// observability hooks can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Observation,
    Action,
    Aggregate,
    Decision,
}

/// Lifecycle state of a [`Task`] within a [`Plan`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// One node of a plan's dependency DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, task_type: TaskType) -> Self {
        Task {
            id: id.into(),
            description: description.into(),
            task_type,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            result: None,
            error: None,
        }
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

/// A DAG of [`Task`]s to execute under one [`Strategy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub description: String,
    pub strategy: Strategy,
    pub tasks: Vec<Task>,
}

impl Plan {
    pub fn new(description: impl Into<String>, strategy: Strategy, tasks: Vec<Task>) -> Self {
        Plan {
            description: description.into(),
            strategy,
            tasks,
        }
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn is_complete(&self) -> bool {
        self.tasks
            .iter()
            .all(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Skipped))
    }

    pub fn success_rate(&self) -> f64 {
        if self.tasks.is_empty() {
            return 1.0;
        }
        let completed = self.tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
        completed as f64 / self.tasks.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_reports_full_success() {
        let plan = Plan::new("empty", Strategy::Sequential, vec![]);
        assert!(plan.is_complete());
        assert_eq!(plan.success_rate(), 1.0);
    }

    #[test]
    fn success_rate_counts_only_completed() {
        let mut a = Task::new("a", "do a", TaskType::Action);
        a.status = TaskStatus::Completed;
        let mut b = Task::new("b", "do b", TaskType::Action);
        b.status = TaskStatus::Failed;
        let plan = Plan::new("p", Strategy::Sequential, vec![a, b]);
        assert_eq!(plan.success_rate(), 0.5);
    }
}
