//! Mock 出站客户端（用于测试，无需网络）
//!
//! 按端点脚本化响应：未配置的端点一律返回传输错误（模拟连接拒绝），
//! 任务结果按入队顺序弹出，调用记录保留供断言。

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::AgentClient;
use crate::error::HiveError;
use crate::protocol::{A2AResult, A2ATask, AgentCard};

/// Mock 客户端：serve_card / push_task_result 预置响应
#[derive(Default)]
pub struct MockAgentClient {
    cards: Mutex<HashMap<String, AgentCard>>,
    task_results: Mutex<HashMap<String, VecDeque<Result<A2AResult, String>>>>,
    /// (endpoint, instruction) 调用记录
    pub calls: Mutex<Vec<(String, String)>>,
}

impl MockAgentClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置端点的 AgentCard（健康检查 / 发现会命中）
    pub fn serve_card(&self, endpoint: &str, card: AgentCard) {
        self.cards
            .lock()
            .expect("mock lock poisoned")
            .insert(endpoint.to_string(), card);
    }

    /// 移除端点卡片（模拟下线）
    pub fn drop_card(&self, endpoint: &str) {
        self.cards
            .lock()
            .expect("mock lock poisoned")
            .remove(endpoint);
    }

    /// 入队一个任务结果
    pub fn push_task_result(&self, endpoint: &str, result: A2AResult) {
        self.task_results
            .lock()
            .expect("mock lock poisoned")
            .entry(endpoint.to_string())
            .or_default()
            .push_back(Ok(result));
    }

    /// 入队一个传输失败
    pub fn push_task_failure(&self, endpoint: &str, message: &str) {
        self.task_results
            .lock()
            .expect("mock lock poisoned")
            .entry(endpoint.to_string())
            .or_default()
            .push_back(Err(message.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn call_task(&self, endpoint: &str, task: A2ATask) -> Result<A2AResult, HiveError> {
        self.calls
            .lock()
            .expect("mock lock poisoned")
            .push((endpoint.to_string(), task.instruction.clone()));
        let next = self
            .task_results
            .lock()
            .expect("mock lock poisoned")
            .get_mut(endpoint)
            .and_then(|q| q.pop_front());
        match next {
            Some(Ok(result)) => Ok(result),
            Some(Err(msg)) => Err(HiveError::Transport(msg)),
            None => Err(HiveError::Transport(format!(
                "connection refused: {}",
                endpoint
            ))),
        }
    }

    async fn fetch_card(&self, endpoint: &str) -> Result<AgentCard, HiveError> {
        self.cards
            .lock()
            .expect("mock lock poisoned")
            .get(endpoint)
            .cloned()
            .ok_or_else(|| HiveError::Transport(format!("connection refused: {}", endpoint)))
    }
}
