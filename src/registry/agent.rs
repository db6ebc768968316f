//! 注册表条目：RegisteredAgent 与健康状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::AgentCard;

/// Agent 健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// 注册后尚未探测
    Unknown,
    Online,
    /// 传输失败 / 超时
    Offline,
    /// 协议层错误（对端可达但响应非法）
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Unknown => "unknown",
            AgentStatus::Online => "online",
            AgentStatus::Offline => "offline",
            AgentStatus::Error => "error",
        }
    }
}

/// 注册表条目：仅由注册表在健康检查与注册 / 注销时修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub name: String,
    /// 基础 URL，任务调用与健康检查都打到这里
    pub endpoint: String,
    /// 最近一次成功探测拿到的卡片（成功时整卡替换）
    pub agent_card: Option<AgentCard>,
    pub status: AgentStatus,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl RegisteredAgent {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, card: Option<AgentCard>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            agent_card: card,
            status: AgentStatus::Unknown,
            last_health_check: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == AgentStatus::Online
    }

    /// 是否声明了指定能力（无卡片视为无能力）
    pub fn has_capability(&self, capability: &str) -> bool {
        self.agent_card
            .as_ref()
            .map(|c| c.has_capability(capability))
            .unwrap_or(false)
    }

    /// 能力集是否覆盖全部要求
    pub fn covers_all(&self, required: &[String]) -> bool {
        self.agent_card
            .as_ref()
            .map(|c| c.covers_all(required))
            .unwrap_or(required.is_empty())
    }
}
