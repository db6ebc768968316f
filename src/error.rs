//! 统一错误类型
//!
//! 所有子系统共用 HiveError：传输错误与熔断拒绝由弹性层产生，协议错误来自
//! A2A 编解码，路由 / 恢复错误来自注册表与工作流。对外结果的 metadata 中
//! 携带 kind() 字符串，公开接口不跨边界抛错。

use thiserror::Error;

/// 编排系统错误（网络、熔断、协议、路由、恢复、持久化）
#[derive(Error, Debug)]
pub enum HiveError {
    /// 连接 / 读取超时、连接拒绝等传输层失败
    #[error("Transport error: {0}")]
    Transport(String),

    /// 熔断器打开，未发起网络请求即拒绝
    #[error("Circuit breaker open for endpoint: {0}")]
    BreakerOpen(String),

    /// 连接池已满且溢出额度用尽
    #[error("Connection pool exhausted for host: {0}")]
    PoolExhausted(String),

    /// 响应格式完好但携带 error 字段，或缺少必填字段
    #[error("Protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    /// 注册表中没有满足能力 / 在线条件的 Agent
    #[error("No suitable agent found: {0}")]
    AgentNotFound(String),

    /// 对没有挂起中断的线程调用 resume
    #[error("No pending interrupt for thread: {0}")]
    ResumeWithoutInterrupt(String),

    /// 注册表 / 检查点读写失败
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 程序不变量被破坏（如持久化状态损坏），视为致命
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 执行被取消
    #[error("Cancelled")]
    Cancelled,
}

impl HiveError {
    /// 稳定的错误类别字符串，写入对外结果的 metadata
    pub fn kind(&self) -> &'static str {
        match self {
            HiveError::Transport(_) => "transport_error",
            HiveError::BreakerOpen(_) => "breaker_open",
            HiveError::PoolExhausted(_) => "pool_exhausted",
            HiveError::Protocol { .. } => "protocol_error",
            HiveError::AgentNotFound(_) => "agent_not_found",
            HiveError::ResumeWithoutInterrupt(_) => "resume_without_interrupt",
            HiveError::Persistence(_) => "persistence_error",
            HiveError::InvalidState(_) => "invalid_state",
            HiveError::Cancelled => "cancelled",
        }
    }

    /// 是否属于传输类失败（用于重试与熔断计数）
    pub fn is_transport(&self) -> bool {
        matches!(self, HiveError::Transport(_) | HiveError::PoolExhausted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(HiveError::Transport("t".into()).kind(), "transport_error");
        assert_eq!(
            HiveError::Protocol { code: -1, message: "m".into() }.kind(),
            "protocol_error"
        );
        assert_eq!(
            HiveError::ResumeWithoutInterrupt("T".into()).kind(),
            "resume_without_interrupt"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(HiveError::Transport("timeout".into()).is_transport());
        assert!(HiveError::PoolExhausted("h".into()).is_transport());
        assert!(!HiveError::BreakerOpen("e".into()).is_transport());
        assert!(!HiveError::Protocol { code: 0, message: String::new() }.is_transport());
    }
}
