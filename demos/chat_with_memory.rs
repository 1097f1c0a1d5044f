//! Two-turn chat demonstrating working-memory accumulation and recall.

use agentcore::{Agent, AgentBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let agent: Agent = AgentBuilder::interactive()
        .api_key(std::env::var("LLM_API_KEY").unwrap_or_default())
        .model("gpt-4o-mini")
        .max_history(20)
        .build()?;

    let first = agent.ask("My name is Alice.").await?;
    println!("assistant: {}", first.content);

    let second = agent.ask("What's my name?").await?;
    println!("assistant: {}", second.content);

    if let Some(memory) = agent.memory() {
        let stats = memory.stats().await;
        println!(
            "memory: working={} episodic={} semantic={}",
            stats.working_len, stats.episodic_len, stats.semantic_len
        );
    }

    Ok(())
}
