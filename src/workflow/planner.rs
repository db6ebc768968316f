//! 外部协作者接口：规划器与步骤执行器
//!
//! 自然语言规划与领域工具实现都不在本 crate 内，这里只定义调用面；
//! RemoteStepExecutor 是内置实现，把步骤经注册表路由到远端 Agent 执行。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::AgentClient;
use crate::error::HiveError;
use crate::protocol::{A2ATask, TaskStatus};
use crate::registry::AgentRegistry;
use crate::workflow::state::StepExecution;

/// 规划结果：一份有序计划，或直接给出最终回复
#[derive(Debug, Clone)]
pub enum PlannerDecision {
    Plan(Vec<String>),
    Response(String),
}

/// 规划器：给定输入与既往步骤产出计划或最终回复
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        input: &str,
        past_steps: &[StepExecution],
    ) -> Result<PlannerDecision, HiveError>;

    /// user_escape 恢复后的强制重规划；默认把修改请求拼进输入重新 plan
    async fn replan(
        &self,
        input: &str,
        past_steps: &[StepExecution],
        modification: &str,
    ) -> Result<PlannerDecision, HiveError> {
        let combined = format!("{}\n\nUser modification request: {}", input, modification);
        self.plan(&combined, past_steps).await
    }
}

/// 步骤执行上下文
#[derive(Debug, Clone, Default)]
pub struct StepContext {
    pub input: String,
    pub thread_id: String,
    pub context: HashMap<String, Value>,
    /// human_input 恢复时带回的用户答复，只对被暂停的那一步有值
    pub resume_input: Option<String>,
}

/// 单步执行结果
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// 正常完成，携带结果文本
    Completed(String),
    /// 失败；fatal 为 true 时整个运行终止
    Failed { error: String, fatal: bool },
    /// 步骤要求人工澄清后才能继续
    NeedsInput { question: String },
    /// 本步骤直接产出最终回复，循环提前退出
    FinalResponse(String),
}

/// 步骤执行器：可能在内部经注册表 + 弹性客户端调远端 Agent
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(&self, step: &str, ctx: &StepContext) -> Result<StepOutcome, HiveError>;
}

/// 内置执行器：按步骤描述路由到能力匹配且在线的远端 Agent
pub struct RemoteStepExecutor {
    registry: Arc<AgentRegistry>,
    client: Arc<dyn AgentClient>,
}

impl RemoteStepExecutor {
    pub fn new(registry: Arc<AgentRegistry>, client: Arc<dyn AgentClient>) -> Self {
        Self { registry, client }
    }
}

#[async_trait]
impl StepExecutor for RemoteStepExecutor {
    async fn execute_step(&self, step: &str, ctx: &StepContext) -> Result<StepOutcome, HiveError> {
        // 路由失败以失败步骤呈现给调用方，不让整个运行崩掉
        let Some(agent) = self.registry.find_best_agent(step, None).await else {
            return Ok(StepOutcome::Failed {
                error: HiveError::AgentNotFound(step.to_string()).to_string(),
                fatal: false,
            });
        };

        let mut task = A2ATask::new(step).with_context(ctx.context.clone());
        if let Some(answer) = &ctx.resume_input {
            task.context.insert(
                "human_input".to_string(),
                Value::String(answer.clone()),
            );
        }

        match self.client.call_task(&agent.endpoint, task).await {
            Ok(result) => match result.status {
                TaskStatus::Completed => Ok(StepOutcome::Completed(
                    result.first_content().unwrap_or("").to_string(),
                )),
                TaskStatus::Interrupted => {
                    let question = result
                        .metadata
                        .get("question")
                        .and_then(|v| v.as_str())
                        .unwrap_or("The agent needs clarification to proceed")
                        .to_string();
                    Ok(StepOutcome::NeedsInput { question })
                }
                TaskStatus::Failed => Ok(StepOutcome::Failed {
                    error: result
                        .error
                        .unwrap_or_else(|| "agent reported failure".to_string()),
                    fatal: false,
                }),
            },
            // 传输 / 熔断失败由循环边界记为失败步骤
            Err(e) => Ok(StepOutcome::Failed {
                error: e.to_string(),
                fatal: false,
            }),
        }
    }
}
