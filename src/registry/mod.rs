//! Agent 注册表
//!
//! 维护已知 Agent 的集合（名称 -> 端点 + 能力卡片 + 健康状态），提供能力路由、
//! 并发健康检查与端点发现；每次变更后整表落盘，启动时先加载再提供服务。

pub mod agent;
pub mod registry;
pub mod store;

pub use agent::{AgentStatus, RegisteredAgent};
pub use registry::{AgentRegistry, RegistryStats};
pub use store::{FileRegistryStore, MemoryRegistryStore, RegistryStore};
