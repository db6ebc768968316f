//! 弹性通信层
//!
//! 所有出站调用都实现 AgentClient：任务调用（execute_task）与自描述调用
//! （get_agent_card）。ResilientClient 为生产实现（连接池 + 熔断 + 重试），
//! MockAgentClient 供测试脚本化响应。

pub mod breaker;
pub mod mock;
pub mod pool;
pub mod resilient;

use async_trait::async_trait;

use crate::error::HiveError;
use crate::protocol::{A2AResult, A2ATask, AgentCard};

pub use breaker::{BreakerPass, BreakerRegistry, BreakerState, CircuitBreaker};
pub use mock::MockAgentClient;
pub use pool::{ConnectionPool, PoolStats, PooledConnection};
pub use resilient::ResilientClient;

/// 出站调用 trait：任务下发与 Agent 卡片拉取
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// 向指定端点下发任务
    async fn call_task(&self, endpoint: &str, task: A2ATask) -> Result<A2AResult, HiveError>;

    /// 拉取指定端点的 AgentCard（健康检查与发现用）
    async fn fetch_card(&self, endpoint: &str) -> Result<AgentCard, HiveError>;
}
