//! AgentCard：Agent 自描述
//!
//! 健康检查成功时整卡替换，不做增量合并。

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HiveError;

/// Agent 自描述卡片：名称、版本、能力集与各操作的端点路径
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// 能力标签集合，用于路由匹配
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// 操作名 -> URL 路径
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub communication_modes: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl AgentCard {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: String::new(),
            description: String::new(),
            capabilities: BTreeSet::new(),
            endpoints: HashMap::new(),
            communication_modes: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// 追加能力标签（链式，便于测试构造）
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// 是否声明了指定能力
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// 是否覆盖了全部要求的能力（超集判定）
    pub fn covers_all(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// 从响应 JSON 解析卡片；缺 name 视为协议错误
    pub fn decode(value: Value) -> Result<Self, HiveError> {
        let card: AgentCard = serde_json::from_value(value).map_err(|e| HiveError::Protocol {
            code: -32700,
            message: format!("invalid agent card: {}", e),
        })?;
        if card.name.trim().is_empty() {
            return Err(HiveError::Protocol {
                code: -32600,
                message: "agent card missing name".to_string(),
            });
        }
        Ok(card)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_minimal_card() {
        let card = AgentCard::decode(json!({"name": "billing"})).unwrap();
        assert_eq!(card.name, "billing");
        assert!(card.capabilities.is_empty());
    }

    #[test]
    fn test_decode_missing_name_is_protocol_error() {
        let err = AgentCard::decode(json!({"version": "1.0"})).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
        let err = AgentCard::decode(json!({"name": "  "})).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
    }

    #[test]
    fn test_capability_superset() {
        let card = AgentCard::new("billing")
            .with_capability("invoice")
            .with_capability("refund");
        assert!(card.has_capability("invoice"));
        assert!(card.covers_all(&["invoice".to_string(), "refund".to_string()]));
        assert!(!card.covers_all(&["invoice".to_string(), "lead".to_string()]));
    }
}
