//! Hive - Rust 分布式智能体编排系统
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **error**: 统一错误分类（传输 / 熔断 / 协议 / 路由 / 恢复）
//! - **protocol**: A2A 协议编解码（AgentCard、任务请求 / 响应）
//! - **client**: 弹性通信层（连接池 + 每端点熔断器 + 重试）
//! - **registry**: Agent 注册表（能力路由、并发健康检查、持久化）
//! - **workflow**: Plan-Execute 状态机与中断协调（可挂起 / 可恢复）
//! - **events**: 编排事件推送（fire-and-forget）
//! - **orchestrator**: 对外门面（submit / resume / interrupt + 注册表管理）
//! - **observability**: tracing 初始化

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod workflow;

pub use error::HiveError;
pub use orchestrator::Orchestrator;
