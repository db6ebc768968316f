//! Plan-Execute 工作流
//!
//! planning 由外部规划器完成，本层从 executing 开始：
//! executing ⇄ interrupted -> executing -> completed | failed。
//! 挂起 / 恢复不依赖运行时续体，全部走显式检查点。

pub mod checkpoint;
pub mod engine;
pub mod interrupt;
pub mod planner;
pub mod state;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use engine::PlanExecuteEngine;
pub use interrupt::{InterruptAck, InterruptCoordinator};
pub use planner::{
    Planner, PlannerDecision, RemoteStepExecutor, StepContext, StepExecutor, StepOutcome,
};
pub use state::{
    InterruptContext, InterruptType, PlanExecuteState, StepExecution, StepStatus,
};
