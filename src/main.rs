//! Forge - Rust 任务执行智能体
//!
//! 入口：初始化日志、加载配置、创建 Agent，按命令行输入创建任务并逐步执行直至 is_last。

use anyhow::Context;
use forge::config::load_config;
use forge::create_agent;
use forge::db::{StepRequest, TaskRequest};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 单次运行最多执行的步数（降级步骤不增长对话，需要外部上限）
const MAX_STEPS_PER_RUN: usize = 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let input = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if input.trim().is_empty() {
        anyhow::bail!("usage: forge <task description>");
    }

    let cfg = load_config(None).context("Failed to load config")?;
    let agent = create_agent(&cfg).await.context("Failed to create agent")?;
    let task = agent
        .create_task(TaskRequest::new(input))
        .await
        .context("Failed to create task")?;

    let mut last_output = None;
    for n in 1..=MAX_STEPS_PER_RUN {
        let outcome = agent
            .execute_step(&task.task_id, StepRequest::default())
            .await
            .with_context(|| format!("Step {n} failed"))?;
        if let forge::StepOutcome::Degraded { reason, .. } = &outcome {
            tracing::warn!(step = n, reason = %reason, "step degraded");
        }
        let step = outcome.into_step();
        tracing::info!(step = n, is_last = step.is_last, status = %step.status, "step done");
        if step.output.is_some() {
            last_output = step.output;
        }
        if step.is_last {
            break;
        }
    }
    agent.end_task(&task.task_id).await;

    let usage = agent.token_usage();
    tracing::info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total(),
        "token usage"
    );

    let output = last_output.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
