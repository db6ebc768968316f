//! Plan-Execute 主循环
//!
//! 取下一个未执行步骤 -> 执行（可能经注册表路由到远端）-> 追加 StepExecution ->
//! 推进 offset -> 判断退出条件。挂起时把状态与中断上下文落盘后归还控制权，
//! 不占用执行 worker；resume 从检查点重建执行，绝不重跑 past_steps 里已有的步骤。
//! 对外结果永不抛错：所有失败路径都折叠为 status=failed 的结构化结果。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::HiveError;
use crate::events::{EventSink, OrchestratorEvent};
use crate::protocol::{A2AResult, Artifact, TaskStatus};
use crate::workflow::checkpoint::CheckpointStore;
use crate::workflow::interrupt::InterruptCoordinator;
use crate::workflow::planner::{Planner, PlannerDecision, StepContext, StepExecutor, StepOutcome};
use crate::workflow::state::{InterruptType, PlanExecuteState, StepStatus};

/// Plan-Execute 引擎：每个 thread_id 同一时刻只被一个 worker 处理
pub struct PlanExecuteEngine {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    checkpoints: Arc<dyn CheckpointStore>,
    interrupts: Arc<InterruptCoordinator>,
    events: Arc<dyn EventSink>,
    max_plan_steps: usize,
    running: Mutex<HashSet<String>>,
}

impl PlanExecuteEngine {
    pub fn new(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        checkpoints: Arc<dyn CheckpointStore>,
        interrupts: Arc<InterruptCoordinator>,
        events: Arc<dyn EventSink>,
        max_plan_steps: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            checkpoints,
            interrupts,
            events,
            max_plan_steps: max_plan_steps.max(1),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// 提交一次新的运行；interrupted 结果的 metadata 里必带 thread_id
    pub async fn submit(
        &self,
        instruction: &str,
        context: HashMap<String, Value>,
        thread_id: Option<String>,
    ) -> A2AResult {
        let thread_id = thread_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if !self.try_start(&thread_id).await {
            return Self::busy_result(&thread_id);
        }
        let result = self.submit_inner(instruction, context, &thread_id).await;
        self.finish(&thread_id).await;
        match result {
            Ok(result) => result,
            Err(e) => Self::failure_result(&thread_id, &e),
        }
    }

    async fn submit_inner(
        &self,
        instruction: &str,
        context: HashMap<String, Value>,
        thread_id: &str,
    ) -> Result<A2AResult, HiveError> {
        let mut state = PlanExecuteState::new(instruction, thread_id);
        state.user_id = context
            .get("user_id")
            .and_then(|v| v.as_str())
            .map(String::from);
        state.context = context;

        match self.planner.plan(instruction, &[]).await? {
            PlannerDecision::Response(response) => {
                state.response = Some(response.clone());
                self.checkpoints.save_state(&state).await?;
                self.events.emit(OrchestratorEvent::RunFinished {
                    thread_id: thread_id.to_string(),
                    status: TaskStatus::Completed,
                });
                return Ok(Self::completed_result(&state, response));
            }
            PlannerDecision::Plan(steps) => {
                state.plan = steps;
            }
        }
        self.checkpoints.save_state(&state).await?;
        tracing::info!(thread_id, steps = state.plan.len(), "plan created");

        self.run_loop(&mut state, None, None).await
    }

    /// 恢复一个挂起的运行
    pub async fn resume(&self, thread_id: &str, user_input: &str) -> A2AResult {
        if !self.try_start(thread_id).await {
            return Self::busy_result(thread_id);
        }
        let result = self.resume_inner(thread_id, user_input).await;
        self.finish(thread_id).await;
        match result {
            Ok(result) => result,
            Err(e) => Self::failure_result(thread_id, &e),
        }
    }

    async fn resume_inner(
        &self,
        thread_id: &str,
        user_input: &str,
    ) -> Result<A2AResult, HiveError> {
        let Some(ctx) = self.interrupts.load_context(thread_id).await? else {
            return Err(HiveError::ResumeWithoutInterrupt(thread_id.to_string()));
        };
        let Some(mut state) = self.checkpoints.load_state(thread_id).await? else {
            return Err(HiveError::InvalidState(format!(
                "interrupt context without checkpointed state for thread {}",
                thread_id
            )));
        };

        match ctx.interrupt_type {
            InterruptType::UserEscape => {
                // 清标记、置强制重规划，把用户的修改请求交给规划器
                state.clear_interrupt_flags();
                state.should_force_replan = true;
                state.replan_request = Some(user_input.to_string());
                match self
                    .planner
                    .replan(&state.input, &state.past_steps, user_input)
                    .await?
                {
                    PlannerDecision::Response(response) => {
                        state.response = Some(response.clone());
                        self.checkpoints.save_state(&state).await?;
                        self.interrupts
                            .clear_after_restart(thread_id, InterruptType::UserEscape)
                            .await;
                        self.events.emit(OrchestratorEvent::RunFinished {
                            thread_id: thread_id.to_string(),
                            status: TaskStatus::Completed,
                        });
                        return Ok(Self::completed_result(&state, response));
                    }
                    PlannerDecision::Plan(steps) => {
                        state.plan = steps;
                        state.plan_step_offset = 0;
                    }
                }
                self.checkpoints.save_state(&state).await?;
                tracing::info!(thread_id, "replanned after user escape");
                self.run_loop(&mut state, None, Some(InterruptType::UserEscape))
                    .await
            }
            InterruptType::HumanInput => {
                // 把答复喂回提出问题的那一步，从暂停处继续
                self.run_loop(
                    &mut state,
                    Some(user_input.to_string()),
                    Some(InterruptType::HumanInput),
                )
                .await
            }
        }
    }

    /// 主循环；pending_resume 表示本次运行由 resume 重建，首个步骤产生结果后
    /// 才清理中断上下文（在那之前失败则保留，resume 可重试）
    async fn run_loop(
        &self,
        state: &mut PlanExecuteState,
        mut resume_input: Option<String>,
        mut pending_resume: Option<InterruptType>,
    ) -> Result<A2AResult, HiveError> {
        loop {
            // user_escape 在步骤察觉之前已写入挂起标记，这里统一收口
            if let Some(reason) = self.interrupts.pending_escape(&state.thread_id).await {
                return self
                    .suspend(state, InterruptType::UserEscape, &reason)
                    .await;
            }

            let Some((_, step)) = state.next_step() else {
                break;
            };
            let step = step.to_string();
            let seq_no = state.past_steps.len();
            if seq_no >= self.max_plan_steps {
                self.events.emit(OrchestratorEvent::RunFinished {
                    thread_id: state.thread_id.clone(),
                    status: TaskStatus::Failed,
                });
                return Ok(A2AResult::failed(format!(
                    "exceeded max plan steps ({})",
                    self.max_plan_steps
                ))
                .with_metadata("thread_id", json!(state.thread_id)));
            }

            self.events.emit(OrchestratorEvent::StepStarted {
                thread_id: state.thread_id.clone(),
                seq_no,
                description: step.clone(),
            });

            let ctx = StepContext {
                input: state.input.clone(),
                thread_id: state.thread_id.clone(),
                context: state.context.clone(),
                resume_input: resume_input.take(),
            };
            let outcome = self.executor.execute_step(&step, &ctx).await;

            // 步骤产出了结果（无论成败），说明恢复已经站稳，清掉中断上下文
            if let Some(interrupt_type) = pending_resume.take() {
                self.interrupts
                    .clear_after_restart(&state.thread_id, interrupt_type)
                    .await;
            }

            let outcome = match outcome {
                Ok(outcome) => outcome,
                // 不变量破坏是致命的，向上冒泡
                Err(e @ HiveError::InvalidState(_)) => return Err(e),
                // 其余错误折叠为失败步骤，由循环边界吸收
                Err(e) => StepOutcome::Failed {
                    error: e.to_string(),
                    fatal: false,
                },
            };

            match outcome {
                StepOutcome::Completed(result) => {
                    state.record_step(&step, StepStatus::Completed, Some(result));
                    self.step_finished(state, seq_no, StepStatus::Completed).await?;
                }
                StepOutcome::FinalResponse(response) => {
                    state.record_step(&step, StepStatus::Completed, Some(response.clone()));
                    state.response = Some(response);
                    self.step_finished(state, seq_no, StepStatus::Completed).await?;
                    break;
                }
                StepOutcome::Failed { error, fatal } => {
                    tracing::warn!(
                        thread_id = %state.thread_id,
                        step = %step,
                        error = %error,
                        fatal,
                        "step failed"
                    );
                    state.record_step(&step, StepStatus::Failed, Some(error.clone()));
                    self.step_finished(state, seq_no, StepStatus::Failed).await?;
                    if fatal {
                        self.events.emit(OrchestratorEvent::RunFinished {
                            thread_id: state.thread_id.clone(),
                            status: TaskStatus::Failed,
                        });
                        return Ok(A2AResult::failed(error)
                            .with_metadata("thread_id", json!(state.thread_id)));
                    }
                }
                StepOutcome::NeedsInput { question } => {
                    return self.suspend(state, InterruptType::HumanInput, &question).await;
                }
            }
        }

        // 恢复的运行可能一步都没执行就正常收尾（如重规划产出空计划），
        // 中断上下文同样要在这里清掉，否则已结束的线程还能被再次 resume
        if let Some(interrupt_type) = pending_resume.take() {
            self.interrupts
                .clear_after_restart(&state.thread_id, interrupt_type)
                .await;
        }

        // 正常退出：显式最终回复，否则用最后一个完成步骤的结果
        let response = state.response.clone().unwrap_or_else(|| {
            state
                .past_steps
                .iter()
                .rev()
                .find(|s| s.status == StepStatus::Completed)
                .and_then(|s| s.result.clone())
                .unwrap_or_default()
        });
        state.response = Some(response.clone());
        self.checkpoints.save_state(state).await?;
        self.events.emit(OrchestratorEvent::RunFinished {
            thread_id: state.thread_id.clone(),
            status: TaskStatus::Completed,
        });
        tracing::info!(
            thread_id = %state.thread_id,
            steps = state.past_steps.len(),
            "run completed"
        );
        Ok(Self::completed_result(state, response))
    }

    async fn step_finished(
        &self,
        state: &PlanExecuteState,
        seq_no: usize,
        status: StepStatus,
    ) -> Result<(), HiveError> {
        self.events.emit(OrchestratorEvent::StepFinished {
            thread_id: state.thread_id.clone(),
            seq_no,
            status,
        });
        self.checkpoints.save_state(state).await
    }

    async fn suspend(
        &self,
        state: &mut PlanExecuteState,
        requested: InterruptType,
        reason: &str,
    ) -> Result<A2AResult, HiveError> {
        let ctx = self
            .interrupts
            .record_suspension(state, requested, reason)
            .await?;
        self.checkpoints.save_state(state).await?;
        Ok(A2AResult::interrupted()
            .with_metadata("thread_id", json!(state.thread_id))
            .with_metadata("interrupt_type", json!(ctx.interrupt_type.as_str()))
            .with_metadata("reason", json!(ctx.reason))
            .with_metadata("completed_steps", json!(ctx.completed_steps))
            .with_metadata("total_steps", json!(ctx.total_steps)))
    }

    async fn try_start(&self, thread_id: &str) -> bool {
        self.running.lock().await.insert(thread_id.to_string())
    }

    async fn finish(&self, thread_id: &str) {
        self.running.lock().await.remove(thread_id);
    }

    fn completed_result(state: &PlanExecuteState, response: String) -> A2AResult {
        A2AResult::completed(vec![Artifact::text(state.task_id.clone(), response)])
            .with_metadata("thread_id", json!(state.thread_id))
            .with_metadata("steps_executed", json!(state.past_steps.len()))
    }

    fn failure_result(thread_id: &str, e: &HiveError) -> A2AResult {
        A2AResult::failed(e.to_string())
            .with_metadata("thread_id", json!(thread_id))
            .with_metadata("error_kind", json!(e.kind()))
    }

    fn busy_result(thread_id: &str) -> A2AResult {
        A2AResult::failed(format!("thread {} is already being processed", thread_id))
            .with_metadata("thread_id", json!(thread_id))
            .with_metadata("error_kind", json!("invalid_state"))
    }
}
