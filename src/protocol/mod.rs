//! A2A 协议编解码
//!
//! 定义任务请求 / 响应与 Agent 自描述（AgentCard）两类消息的结构与必填字段；
//! 实际传输（HTTP+JSON）由通信层负责，这里只管形状与校验。

pub mod card;
pub mod task;

pub use card::AgentCard;
pub use task::{
    A2AResult, A2ATask, Artifact, TaskRequest, TaskResponse, TaskStatus,
    CARD_METHOD, TASK_METHOD,
};
