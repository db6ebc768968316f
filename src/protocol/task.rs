//! A2A 任务消息：出站请求与结果
//!
//! TaskRequest/TaskResponse 是传输无关的信封：请求携带 method + task，
//! 响应要么带 result 要么带 error，二者都通过 decode 做必填字段校验。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::HiveError;

/// 任务调用的方法名
pub const TASK_METHOD: &str = "execute_task";
/// 自描述调用的方法名
pub const CARD_METHOD: &str = "get_agent_card";

/// 出站任务：创建后不可变，每次调用新建一个
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2ATask {
    pub id: String,
    pub instruction: String,
    /// 原样转发给对端的上下文
    #[serde(default)]
    pub context: HashMap<String, Value>,
    /// 调用方会话状态快照
    #[serde(default)]
    pub state_snapshot: HashMap<String, Value>,
}

impl A2ATask {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            instruction: instruction.into(),
            context: HashMap::new(),
            state_snapshot: HashMap::new(),
        }
    }

    pub fn with_context(mut self, context: HashMap<String, Value>) -> Self {
        self.context = context;
        self
    }

    pub fn with_state_snapshot(mut self, snapshot: HashMap<String, Value>) -> Self {
        self.state_snapshot = snapshot;
        self
    }
}

/// 结果产物（有序）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub task_id: String,
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl Artifact {
    pub fn text(task_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.into(),
            content: content.into(),
            content_type: default_content_type(),
        }
    }
}

/// 任务终态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
    Interrupted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Interrupted => "interrupted",
        }
    }
}

/// 单次调用的结果：产物列表 + 状态 + 可选错误
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct A2AResult {
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    pub status: TaskStatus,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl A2AResult {
    pub fn completed(artifacts: Vec<Artifact>) -> Self {
        Self {
            artifacts,
            status: TaskStatus::Completed,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            artifacts: Vec::new(),
            status: TaskStatus::Failed,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn interrupted() -> Self {
        Self {
            artifacts: Vec::new(),
            status: TaskStatus::Interrupted,
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 首个文本产物的内容（常用于把远端结果当作步骤输出）
    pub fn first_content(&self) -> Option<&str> {
        self.artifacts.first().map(|a| a.content.as_str())
    }
}

/// 出站请求信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub method: String,
    pub params: TaskParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskParams {
    pub task: A2ATask,
}

impl TaskRequest {
    /// 构造任务调用请求；空 id 视为调用方编程错误，直接报协议错误
    pub fn execute(task: A2ATask) -> Result<Self, HiveError> {
        if task.id.trim().is_empty() {
            return Err(HiveError::Protocol {
                code: -32600,
                message: "task id must be non-empty".to_string(),
            });
        }
        Ok(Self {
            method: TASK_METHOD.to_string(),
            params: TaskParams { task },
        })
    }
}

/// 响应信封：result 与 error 互斥
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub result: Option<A2AResult>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl TaskResponse {
    /// 解析响应 JSON：error 字段存在或缺少 result/status 均为协议错误
    pub fn decode(value: Value) -> Result<A2AResult, HiveError> {
        let resp: TaskResponse = serde_json::from_value(value).map_err(|e| HiveError::Protocol {
            code: -32700,
            message: format!("malformed task response: {}", e),
        })?;
        if let Some(err) = resp.error {
            return Err(HiveError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        resp.result.ok_or_else(|| HiveError::Protocol {
            code: -32600,
            message: "task response missing result".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_gets_unique_id() {
        let a = A2ATask::new("do x");
        let b = A2ATask::new("do x");
        assert!(!a.id.is_empty());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_task_id_rejected() {
        let mut task = A2ATask::new("do x");
        task.id = "  ".to_string();
        let err = TaskRequest::execute(task).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
    }

    #[test]
    fn test_decode_result() {
        let value = json!({
            "result": {
                "artifacts": [
                    {"id": "a1", "task_id": "t1", "content": "done", "content_type": "text/plain"}
                ],
                "status": "completed"
            }
        });
        let result = TaskResponse::decode(value).unwrap();
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.first_content(), Some("done"));
    }

    #[test]
    fn test_decode_error_envelope() {
        let value = json!({"error": {"code": -32000, "message": "agent busy"}});
        match TaskResponse::decode(value) {
            Err(HiveError::Protocol { code, message }) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "agent busy");
            }
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_result_and_status() {
        let err = TaskResponse::decode(json!({})).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
        // result 存在但缺 status 同样是协议错误
        let err = TaskResponse::decode(json!({"result": {"artifacts": []}})).unwrap_err();
        assert_eq!(err.kind(), "protocol_error");
    }
}
