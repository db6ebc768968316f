//! 编排器集成测试：步骤顺序、挂起 / 恢复、撞车裁决与能力路由场景

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use hive::client::{AgentClient, MockAgentClient};
use hive::error::HiveError;
use hive::events::NullEventSink;
use hive::protocol::{A2AResult, AgentCard, Artifact, TaskStatus};
use hive::registry::{AgentRegistry, MemoryRegistryStore};
use hive::workflow::{
    CheckpointStore, InterruptCoordinator, InterruptType, MemoryCheckpointStore,
    PlanExecuteEngine, Planner, PlannerDecision, RemoteStepExecutor, StepContext, StepExecution,
    StepExecutor, StepOutcome, StepStatus,
};
use hive::Orchestrator;

/// 固定计划的规划器；replan 固定产出 revised 计划
struct ScriptedPlanner {
    plan: Vec<String>,
    revised: Vec<String>,
}

impl ScriptedPlanner {
    fn new(plan: &[&str]) -> Self {
        Self {
            plan: plan.iter().map(|s| s.to_string()).collect(),
            revised: vec!["revised step".to_string()],
        }
    }

    fn with_revised(mut self, revised: &[&str]) -> Self {
        self.revised = revised.iter().map(|s| s.to_string()).collect();
        self
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(
        &self,
        _input: &str,
        _past_steps: &[StepExecution],
    ) -> Result<PlannerDecision, HiveError> {
        Ok(PlannerDecision::Plan(self.plan.clone()))
    }

    async fn replan(
        &self,
        _input: &str,
        _past_steps: &[StepExecution],
        _modification: &str,
    ) -> Result<PlannerDecision, HiveError> {
        Ok(PlannerDecision::Plan(self.revised.clone()))
    }
}

/// 按描述决定结果的执行器：包含 "ask user" 的步骤要求人工输入，
/// 带着 resume_input 再来时用答复完成；包含 "fail" 的步骤失败。
struct ScriptedExecutor;

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute_step(&self, step: &str, ctx: &StepContext) -> Result<StepOutcome, HiveError> {
        if let Some(answer) = &ctx.resume_input {
            return Ok(StepOutcome::Completed(format!("user answered: {}", answer)));
        }
        if step.contains("ask user") {
            return Ok(StepOutcome::NeedsInput {
                question: "Confirm close for $50k?".to_string(),
            });
        }
        if step.contains("fail") {
            return Ok(StepOutcome::Failed {
                error: "step exploded".to_string(),
                fatal: false,
            });
        }
        Ok(StepOutcome::Completed(format!("done: {}", step)))
    }
}

struct Harness {
    orchestrator: Orchestrator,
    checkpoints: Arc<MemoryCheckpointStore>,
}

fn harness(plan: &[&str]) -> Harness {
    let client = Arc::new(MockAgentClient::new());
    let registry = Arc::new(
        AgentRegistry::new(
            Arc::new(MemoryRegistryStore::new()),
            client as Arc<dyn AgentClient>,
        )
        .unwrap(),
    );
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let orchestrator = Orchestrator::with_components(
        registry,
        Arc::new(ScriptedPlanner::new(plan)),
        Arc::new(ScriptedExecutor),
        checkpoints.clone() as Arc<dyn CheckpointStore>,
        Arc::new(NullEventSink),
        50,
    );
    Harness {
        orchestrator,
        checkpoints,
    }
}

fn thread_id_of(result: &A2AResult) -> String {
    result
        .metadata
        .get("thread_id")
        .and_then(|v| v.as_str())
        .expect("thread_id must be present")
        .to_string()
}

#[tokio::test]
async fn test_full_plan_executes_in_seq_order() {
    let h = harness(&["lookup account", "prepare quote", "close deal"]);
    let result = h.orchestrator.submit_task("close the deal", None, None).await;
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.first_content(), Some("done: close deal"));

    let thread_id = thread_id_of(&result);
    let state = h
        .checkpoints
        .load_state(&thread_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.past_steps.len(), 3);
    for (i, step) in state.past_steps.iter().enumerate() {
        assert_eq!(step.seq_no, i);
        assert_eq!(step.status, StepStatus::Completed);
    }
}

#[tokio::test]
async fn test_failed_step_is_recorded_not_fatal() {
    let h = harness(&["lookup account", "fail loudly", "close deal"]);
    let result = h.orchestrator.submit_task("close the deal", None, None).await;
    // 非致命失败被记录为失败步骤，运行继续到完成
    assert_eq!(result.status, TaskStatus::Completed);

    let state = h
        .checkpoints
        .load_state(&thread_id_of(&result))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.past_steps[1].status, StepStatus::Failed);
    assert_eq!(state.past_steps[2].status, StepStatus::Completed);
}

#[tokio::test]
async fn test_human_input_interrupt_then_resume_completes() {
    let h = harness(&["lookup account", "ask user for confirmation", "close deal"]);
    let result = h
        .orchestrator
        .submit_task("close deal for acme", None, None)
        .await;

    assert_eq!(result.status, TaskStatus::Interrupted);
    let thread_id = thread_id_of(&result);
    assert_eq!(
        result.metadata.get("interrupt_type").and_then(|v| v.as_str()),
        Some("human_input")
    );
    assert_eq!(
        result.metadata.get("reason").and_then(|v| v.as_str()),
        Some("Confirm close for $50k?")
    );
    // 第 1 步已完成，第 2 步未入 past_steps（暂停在它身上）
    let state = h.checkpoints.load_state(&thread_id).await.unwrap().unwrap();
    assert_eq!(state.past_steps.len(), 1);

    let resumed = h.orchestrator.resume_task(&thread_id, "yes").await;
    assert_eq!(resumed.status, TaskStatus::Completed);

    let state = h.checkpoints.load_state(&thread_id).await.unwrap().unwrap();
    assert_eq!(state.past_steps.len(), 3);
    assert_eq!(
        state.past_steps[1].result.as_deref(),
        Some("user answered: yes")
    );
    // 成功恢复后中断上下文被清除
    assert!(h.checkpoints.load_interrupt(&thread_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resume_without_interrupt_is_distinct_error() {
    let h = harness(&["lookup account"]);
    let result = h.orchestrator.resume_task("no-such-thread", "hi").await;
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(
        result.metadata.get("error_kind").and_then(|v| v.as_str()),
        Some("resume_without_interrupt")
    );
}

#[tokio::test]
async fn test_pending_escape_suspends_before_next_step() {
    let h = harness(&["lookup account", "close deal"]);
    let ack = h.orchestrator.interrupt_task("t-escape", "abort this").await;
    assert!(ack.success);
    // 幂等：重复中断是 no-op 成功
    let ack = h.orchestrator.interrupt_task("t-escape", "again").await;
    assert!(ack.success);

    let result = h
        .orchestrator
        .submit_task("close the deal", None, Some("t-escape".to_string()))
        .await;
    assert_eq!(result.status, TaskStatus::Interrupted);
    assert_eq!(
        result.metadata.get("interrupt_type").and_then(|v| v.as_str()),
        Some("user_escape")
    );

    // user_escape 恢复触发重规划，revised 计划跑完
    let resumed = h.orchestrator.resume_task("t-escape", "do it differently").await;
    assert_eq!(resumed.status, TaskStatus::Completed);
    assert_eq!(resumed.first_content(), Some("done: revised step"));

    let state = h.checkpoints.load_state("t-escape").await.unwrap().unwrap();
    assert!(state.should_force_replan);
    assert_eq!(state.replan_request.as_deref(), Some("do it differently"));
}

/// 恢复后重规划产出空计划：运行一步不跑直接收尾，中断上下文也必须清掉
#[tokio::test]
async fn test_empty_replan_completes_and_clears_interrupt() {
    let client = Arc::new(MockAgentClient::new());
    let registry = Arc::new(
        AgentRegistry::new(
            Arc::new(MemoryRegistryStore::new()),
            client as Arc<dyn AgentClient>,
        )
        .unwrap(),
    );
    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let orchestrator = Orchestrator::with_components(
        registry,
        Arc::new(ScriptedPlanner::new(&["lookup account", "close deal"]).with_revised(&[])),
        Arc::new(ScriptedExecutor),
        checkpoints.clone() as Arc<dyn CheckpointStore>,
        Arc::new(NullEventSink),
        50,
    );

    orchestrator.interrupt_task("t-empty", "abort").await;
    let result = orchestrator
        .submit_task("close the deal", None, Some("t-empty".to_string()))
        .await;
    assert_eq!(result.status, TaskStatus::Interrupted);

    let resumed = orchestrator.resume_task("t-empty", "never mind").await;
    assert_eq!(resumed.status, TaskStatus::Completed);
    assert!(checkpoints.load_interrupt("t-empty").await.unwrap().is_none());

    // 已结束的线程再 resume 是明确的错误，而不是又跑一遍
    let again = orchestrator.resume_task("t-empty", "hi").await;
    assert_eq!(again.status, TaskStatus::Failed);
    assert_eq!(
        again.metadata.get("error_kind").and_then(|v| v.as_str()),
        Some("resume_without_interrupt")
    );
}

/// 撞车场景：步骤执行期间用户先请求中止，随后该步骤要求 human_input
#[tokio::test]
async fn test_clash_user_escape_wins_over_human_input() {
    struct ClashExecutor {
        interrupts: Arc<InterruptCoordinator>,
    }

    #[async_trait]
    impl StepExecutor for ClashExecutor {
        async fn execute_step(
            &self,
            step: &str,
            ctx: &StepContext,
        ) -> Result<StepOutcome, HiveError> {
            if step.contains("ask user") {
                // 步骤执行中途，用户异步请求中止
                self.interrupts.interrupt_task(&ctx.thread_id, "abort").await;
                return Ok(StepOutcome::NeedsInput {
                    question: "stale question?".to_string(),
                });
            }
            Ok(StepOutcome::Completed(format!("done: {}", step)))
        }
    }

    let checkpoints = Arc::new(MemoryCheckpointStore::new());
    let interrupts = Arc::new(InterruptCoordinator::new(
        checkpoints.clone() as Arc<dyn CheckpointStore>,
        Arc::new(NullEventSink),
    ));
    let engine = PlanExecuteEngine::new(
        Arc::new(ScriptedPlanner::new(&["lookup", "ask user to confirm"])),
        Arc::new(ClashExecutor {
            interrupts: interrupts.clone(),
        }),
        checkpoints.clone() as Arc<dyn CheckpointStore>,
        interrupts.clone(),
        Arc::new(NullEventSink),
        50,
    );

    let result = engine
        .submit("close it", HashMap::new(), Some("t-clash".to_string()))
        .await;
    assert_eq!(result.status, TaskStatus::Interrupted);
    // user_escape 赢，过期的澄清问题被丢弃
    assert_eq!(
        result.metadata.get("interrupt_type").and_then(|v| v.as_str()),
        Some("user_escape")
    );
    assert_eq!(
        result.metadata.get("reason").and_then(|v| v.as_str()),
        Some("abort")
    );
    let ctx = checkpoints.load_interrupt("t-clash").await.unwrap().unwrap();
    assert_eq!(ctx.interrupt_type, InterruptType::UserEscape);
}

#[tokio::test]
async fn test_concurrent_submit_same_thread_is_rejected() {
    struct SlowExecutor;

    #[async_trait]
    impl StepExecutor for SlowExecutor {
        async fn execute_step(
            &self,
            step: &str,
            _ctx: &StepContext,
        ) -> Result<StepOutcome, HiveError> {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            Ok(StepOutcome::Completed(format!("done: {}", step)))
        }
    }

    let client = Arc::new(MockAgentClient::new());
    let registry = Arc::new(
        AgentRegistry::new(
            Arc::new(MemoryRegistryStore::new()),
            client as Arc<dyn AgentClient>,
        )
        .unwrap(),
    );
    let orchestrator = Arc::new(Orchestrator::with_components(
        registry,
        Arc::new(ScriptedPlanner::new(&["slow step"])),
        Arc::new(SlowExecutor),
        Arc::new(MemoryCheckpointStore::new()) as Arc<dyn CheckpointStore>,
        Arc::new(NullEventSink),
        50,
    ));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator
                .submit_task("task", None, Some("t-busy".to_string()))
                .await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;

    let second = orchestrator
        .submit_task("task", None, Some("t-busy".to_string()))
        .await;
    assert_eq!(second.status, TaskStatus::Failed);
    assert_eq!(
        second.metadata.get("error_kind").and_then(|v| v.as_str()),
        Some("invalid_state")
    );

    let first = first.await.unwrap();
    assert_eq!(first.status, TaskStatus::Completed);
}

/// 场景：billing 在线（invoice），crm 离线（lead）；步骤经注册表路由到 billing
#[tokio::test]
async fn test_remote_routing_scenario() {
    let client = Arc::new(MockAgentClient::new());
    let registry = Arc::new(
        AgentRegistry::new(
            Arc::new(MemoryRegistryStore::new()),
            client.clone() as Arc<dyn AgentClient>,
        )
        .unwrap(),
    );
    client.serve_card(
        "http://billing:8080",
        AgentCard::new("billing")
            .with_capability("invoice")
            .with_description("sends invoices"),
    );
    registry
        .register("billing", "http://billing:8080", None)
        .await
        .unwrap();
    registry
        .register("crm", "http://crm:8080", None)
        .await
        .unwrap();
    registry.health_check_all().await;

    // findBestAgent 的两个分支
    assert_eq!(
        registry
            .find_best_agent("send an invoice", Some(&["invoice".to_string()]))
            .await
            .unwrap()
            .name,
        "billing"
    );
    assert!(registry
        .find_best_agent("send an invoice", Some(&["lead".to_string()]))
        .await
        .is_none());

    client.push_task_result(
        "http://billing:8080",
        A2AResult::completed(vec![Artifact::text("t", "invoice #42 sent")]),
    );

    let orchestrator = Orchestrator::with_components(
        registry.clone(),
        Arc::new(ScriptedPlanner::new(&["send an invoice"])),
        Arc::new(RemoteStepExecutor::new(
            registry,
            client.clone() as Arc<dyn AgentClient>,
        )),
        Arc::new(MemoryCheckpointStore::new()) as Arc<dyn CheckpointStore>,
        Arc::new(NullEventSink),
        50,
    );

    let result = orchestrator
        .submit_task("send an invoice to acme", None, None)
        .await;
    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.first_content(), Some("invoice #42 sent"));

    let calls = client.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "http://billing:8080");
}
