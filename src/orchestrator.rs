//! 对外门面
//!
//! 显式构造、依赖注入的服务对象（new / close 生命周期），不依赖任何全局单例。
//! submit / resume / interrupt 永不跨边界抛错：失败折叠为 status=failed 的结果，
//! metadata 里带 error_kind。注册表管理面（list / health_check / stats）一并在此。

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::client::{AgentClient, ResilientClient};
use crate::config::AppConfig;
use crate::error::HiveError;
use crate::events::{EventSink, NullEventSink};
use crate::protocol::{A2AResult, AgentCard};
use crate::registry::{AgentRegistry, FileRegistryStore, RegisteredAgent, RegistryStats};
use crate::workflow::{
    CheckpointStore, FileCheckpointStore, InterruptAck, InterruptCoordinator, PlanExecuteEngine,
    Planner, RemoteStepExecutor, StepExecutor,
};

/// 编排器：注册表 + 弹性客户端 + Plan-Execute 引擎的组合根
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    engine: PlanExecuteEngine,
    interrupts: Arc<InterruptCoordinator>,
    /// 生产构造时持有，close 时关池；测试注入 dyn client 则为 None
    resilient: Option<Arc<ResilientClient>>,
}

impl Orchestrator {
    /// 生产构造：文件持久化 + RemoteStepExecutor；规划器由调用方注入
    pub fn new(config: &AppConfig, planner: Arc<dyn Planner>) -> Result<Self, HiveError> {
        let resilient = Arc::new(ResilientClient::new(&config.client));
        let client: Arc<dyn AgentClient> = resilient.clone();
        let registry = Arc::new(AgentRegistry::new(
            Arc::new(FileRegistryStore::new(config.registry_store_path())),
            client.clone(),
        )?);
        let executor: Arc<dyn StepExecutor> =
            Arc::new(RemoteStepExecutor::new(registry.clone(), client));
        let checkpoints: Arc<dyn CheckpointStore> =
            Arc::new(FileCheckpointStore::new(config.checkpoint_dir()));
        let events: Arc<dyn EventSink> = Arc::new(NullEventSink);

        let mut this = Self::with_components(
            registry,
            planner,
            executor,
            checkpoints,
            events,
            config.workflow.max_plan_steps,
        );
        this.resilient = Some(resilient);
        Ok(this)
    }

    /// 完全依赖注入的构造（测试 / 嵌入用）
    pub fn with_components(
        registry: Arc<AgentRegistry>,
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        events: Arc<dyn EventSink>,
        max_plan_steps: usize,
    ) -> Self {
        let interrupts = Arc::new(InterruptCoordinator::new(checkpoints.clone(), events.clone()));
        let engine = PlanExecuteEngine::new(
            planner,
            executor,
            checkpoints,
            interrupts.clone(),
            events,
            max_plan_steps,
        );
        Self {
            registry,
            engine,
            interrupts,
            resilient: None,
        }
    }

    /// 提交任务；status ∈ {completed, failed, interrupted}，
    /// interrupted 时 metadata.thread_id 必在，供 resume_task 使用
    pub async fn submit_task(
        &self,
        instruction: &str,
        context: Option<HashMap<String, Value>>,
        thread_id: Option<String>,
    ) -> A2AResult {
        self.engine
            .submit(instruction, context.unwrap_or_default(), thread_id)
            .await
    }

    /// 恢复挂起的线程；没有挂起中断时返回 resume_without_interrupt 失败结果
    pub async fn resume_task(&self, thread_id: &str, user_input: &str) -> A2AResult {
        self.engine.resume(thread_id, user_input).await
    }

    /// 请求中止 / 修改在途计划；幂等
    pub async fn interrupt_task(&self, thread_id: &str, reason: &str) -> InterruptAck {
        self.interrupts.interrupt_task(thread_id, reason).await
    }

    // --- 注册表管理面 ---

    pub async fn register_agent(
        &self,
        name: &str,
        endpoint: &str,
        card: Option<AgentCard>,
    ) -> Result<(), HiveError> {
        self.registry.register(name, endpoint, card).await
    }

    pub async fn unregister_agent(&self, name: &str) -> Result<bool, HiveError> {
        self.registry.unregister(name).await
    }

    pub async fn list_agents(&self) -> Vec<RegisteredAgent> {
        self.registry.list().await
    }

    /// name 给定时只探测该 Agent，否则全量并发探测
    pub async fn health_check(&self, name: Option<&str>) -> HashMap<String, bool> {
        match name {
            Some(name) => {
                let online = self.registry.health_check_one(name).await;
                HashMap::from([(name.to_string(), online)])
            }
            None => self.registry.health_check_all().await,
        }
    }

    pub async fn discover(&self, endpoints: &[String]) -> usize {
        self.registry.discover(endpoints).await
    }

    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// 关闭：停掉连接池后台清扫
    pub async fn close(&self) {
        if let Some(client) = &self.resilient {
            client.close().await;
        }
        tracing::info!("orchestrator closed");
    }
}
