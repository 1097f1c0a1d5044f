//! Builds a small diamond-shaped DAG (A -> {B, C} -> D) and runs it under
//! the parallel strategy.

use agentcore::planner::{Plan, Strategy, Task, TaskType};
use agentcore::AgentBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let agent = AgentBuilder::batch()
        .api_key(std::env::var("LLM_API_KEY").unwrap_or_default())
        .model("gpt-4o-mini")
        .build()?;

    let plan = Plan::new(
        "research and summarize",
        Strategy::Parallel,
        vec![
            Task::new("gather_a", "List three facts about renewable energy.", TaskType::Observation),
            Task::new("gather_b", "List three facts about battery storage.", TaskType::Observation)
                .depends_on(Vec::<String>::new()),
            Task::new("summarize", "Summarize the gathered facts into one paragraph.", TaskType::Aggregate)
                .depends_on(vec!["gather_a", "gather_b"]),
        ],
    );

    let output = agent.execute_plan(plan).await?;

    println!(
        "success_rate={:.2} task_count={}",
        output.metrics.success_rate, output.metrics.task_count
    );
    for task in &output.plan.tasks {
        println!("- {} [{:?}]: {:?}", task.id, task.status, task.result);
    }
    for event in &output.timeline {
        println!("timeline: {} {} {}", event.timestamp_millis, event.event_type, event.description);
    }

    Ok(())
}
