//! 工作流状态模型
//!
//! PlanExecuteState 是检查点单元：从计划创建到终态的整个生命周期按 thread_id
//! 持久化，挂起 / 恢复跨进程存活。past_steps 只追加，seq_no 严格递增。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 单步状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
    Skipped,
}

/// 一条已完成的步骤记录，写入后不再修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub seq_no: usize,
    pub description: String,
    pub status: StepStatus,
    pub result: Option<String>,
}

/// 中断来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterruptType {
    /// 当前步骤自己要求澄清
    HumanInput,
    /// 操作员异步要求中止 / 修改
    UserEscape,
}

impl InterruptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptType::HumanInput => "human_input",
            InterruptType::UserEscape => "user_escape",
        }
    }
}

/// 一次 plan-execute 运行的完整状态（检查点单元）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanExecuteState {
    pub input: String,
    /// 有序步骤描述
    pub plan: Vec<String>,
    /// 只追加；seq_no == 追加时的长度
    pub past_steps: Vec<StepExecution>,
    pub response: Option<String>,
    pub thread_id: String,
    pub task_id: String,
    pub user_id: Option<String>,
    /// 下一个未执行步骤在 plan 中的下标
    pub plan_step_offset: usize,
    /// 原样携带的调用方上下文
    #[serde(default)]
    pub context: HashMap<String, Value>,
    // 瞬态中断标记：user_escape 在步骤察觉之前写入这里
    #[serde(default)]
    pub user_interrupted: bool,
    #[serde(default)]
    pub interrupt_reason: Option<String>,
    #[serde(default)]
    pub interrupt_timestamp: Option<DateTime<Utc>>,
    /// 恢复 user_escape 时置位，外部规划器据此强制重规划
    #[serde(default)]
    pub should_force_replan: bool,
    #[serde(default)]
    pub replan_request: Option<String>,
}

impl PlanExecuteState {
    pub fn new(input: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            plan: Vec::new(),
            past_steps: Vec::new(),
            response: None,
            thread_id: thread_id.into(),
            task_id: Uuid::new_v4().to_string(),
            user_id: None,
            plan_step_offset: 0,
            context: HashMap::new(),
            user_interrupted: false,
            interrupt_reason: None,
            interrupt_timestamp: None,
            should_force_replan: false,
            replan_request: None,
        }
    }

    /// 下一个未执行的步骤（下标 + 描述）
    pub fn next_step(&self) -> Option<(usize, &str)> {
        self.plan
            .get(self.plan_step_offset)
            .map(|s| (self.plan_step_offset, s.as_str()))
    }

    /// 追加一条步骤记录并推进 offset；seq_no 由追加位置决定，保证严格递增
    pub fn record_step(&mut self, description: &str, status: StepStatus, result: Option<String>) {
        self.past_steps.push(StepExecution {
            seq_no: self.past_steps.len(),
            description: description.to_string(),
            status,
            result,
        });
        self.plan_step_offset += 1;
    }

    /// 标记 user_escape（在步骤察觉之前写状态）
    pub fn mark_user_interrupted(&mut self, reason: &str) {
        self.user_interrupted = true;
        self.interrupt_reason = Some(reason.to_string());
        self.interrupt_timestamp = Some(Utc::now());
    }

    /// 恢复时清理中断标记
    pub fn clear_interrupt_flags(&mut self) {
        self.user_interrupted = false;
        self.interrupt_reason = None;
        self.interrupt_timestamp = None;
    }

    pub fn completed_steps(&self) -> usize {
        self.past_steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    /// 计划中的所有步骤是否都已执行
    pub fn plan_exhausted(&self) -> bool {
        self.plan_step_offset >= self.plan.len()
    }
}

/// 挂起时记录的中断上下文：每个 thread_id 至多一个，新记录整体替换旧记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptContext {
    pub thread_id: String,
    pub interrupt_type: InterruptType,
    pub reason: String,
    pub interrupt_time: DateTime<Utc>,
    /// 挂起时的计划快照
    pub current_plan: Vec<String>,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// 给人看的状态子集（解释为什么暂停）
    pub state_snapshot: HashMap<String, Value>,
}

impl InterruptContext {
    /// 从运行状态构建：进度计数 + 解释性快照
    pub fn from_state(
        state: &PlanExecuteState,
        interrupt_type: InterruptType,
        reason: &str,
    ) -> Self {
        let mut snapshot = HashMap::new();
        snapshot.insert("input".to_string(), Value::String(state.input.clone()));
        snapshot.insert("task_id".to_string(), Value::String(state.task_id.clone()));
        if let Some((_, step)) = state.next_step() {
            snapshot.insert("current_step".to_string(), Value::String(step.to_string()));
        }
        Self {
            thread_id: state.thread_id.clone(),
            interrupt_type,
            reason: reason.to_string(),
            interrupt_time: Utc::now(),
            current_plan: state.plan.clone(),
            completed_steps: state.completed_steps(),
            total_steps: state.plan.len(),
            state_snapshot: snapshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_step_keeps_seq_no_order() {
        let mut state = PlanExecuteState::new("do things", "t1");
        state.plan = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        while let Some((_, step)) = state.next_step() {
            let step = step.to_string();
            state.record_step(&step, StepStatus::Completed, Some("ok".to_string()));
        }

        assert!(state.plan_exhausted());
        assert_eq!(state.past_steps.len(), 3);
        for (i, s) in state.past_steps.iter().enumerate() {
            assert_eq!(s.seq_no, i);
        }
    }

    #[test]
    fn test_interrupt_flags_roundtrip() {
        let mut state = PlanExecuteState::new("x", "t1");
        state.mark_user_interrupted("please stop");
        assert!(state.user_interrupted);
        assert_eq!(state.interrupt_reason.as_deref(), Some("please stop"));
        assert!(state.interrupt_timestamp.is_some());

        state.clear_interrupt_flags();
        assert!(!state.user_interrupted);
        assert!(state.interrupt_reason.is_none());
    }

    #[test]
    fn test_context_from_state_counts_progress() {
        let mut state = PlanExecuteState::new("x", "t1");
        state.plan = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        state.record_step("a", StepStatus::Completed, None);
        state.record_step("b", StepStatus::Failed, Some("boom".to_string()));

        let ctx = InterruptContext::from_state(&state, InterruptType::HumanInput, "need input");
        // 失败的步骤不算完成
        assert_eq!(ctx.completed_steps, 1);
        assert_eq!(ctx.total_steps, 3);
        assert_eq!(ctx.current_plan.len(), 3);
        assert_eq!(
            ctx.state_snapshot.get("current_step"),
            Some(&Value::String("c".to_string()))
        );
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let mut state = PlanExecuteState::new("x", "t1");
        state.plan = vec!["a".to_string()];
        state.mark_user_interrupted("abort");
        let json = serde_json::to_string(&state).unwrap();
        let back: PlanExecuteState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.thread_id, "t1");
        assert!(back.user_interrupted);
    }
}
