//! hive 演示入口：加载配置，发现配置里的候选端点，跑一轮健康检查并打印统计。

use std::sync::Arc;

use hive::config::load_config;
use hive::workflow::{Planner, PlannerDecision};
use hive::{HiveError, Orchestrator};

/// 演示用规划器：把整条指令当作单步计划
struct PassthroughPlanner;

#[async_trait::async_trait]
impl Planner for PassthroughPlanner {
    async fn plan(
        &self,
        input: &str,
        _past_steps: &[hive::workflow::StepExecution],
    ) -> Result<PlannerDecision, HiveError> {
        Ok(PlannerDecision::Plan(vec![input.to_string()]))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config = load_config(None)?;
    let orchestrator = Orchestrator::new(&config, Arc::new(PassthroughPlanner))?;

    if !config.registry.discover_endpoints.is_empty() {
        let found = orchestrator
            .discover(&config.registry.discover_endpoints)
            .await;
        tracing::info!(found, "endpoint discovery finished");
    }

    let results = orchestrator.health_check(None).await;
    for (name, online) in &results {
        tracing::info!(name, online, "agent health");
    }

    let stats = orchestrator.stats().await;
    tracing::info!(
        total = stats.total,
        capabilities = ?stats.capabilities,
        by_status = ?stats.by_status,
        "registry stats"
    );

    orchestrator.close().await;
    Ok(())
}
