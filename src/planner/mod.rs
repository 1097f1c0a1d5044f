//! Planner/Executor: DAG validation and task scheduling under
//! Sequential, Parallel, and Adaptive strategies.

pub mod dag;
pub mod executor;
pub mod types;

pub use dag::{levels, validate};
pub use executor::{PlanExecutor, PlanMetrics, PlanOutput, PlannerConfig};
pub use types::{Plan, Strategy, Task, TaskStatus, TaskType};

pub use crate::core::TimelineEvent;
