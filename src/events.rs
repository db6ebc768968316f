//! 编排事件推送
//!
//! 中断记录 / 恢复与步骤进度通过 EventSink 通知外部（UI 流式更新用）；
//! fire-and-forget，推送失败绝不影响编排路径本身。

use serde::Serialize;

use crate::protocol::TaskStatus;
use crate::workflow::state::{InterruptType, StepStatus};

/// 编排过程事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    StepStarted {
        thread_id: String,
        seq_no: usize,
        description: String,
    },
    StepFinished {
        thread_id: String,
        seq_no: usize,
        status: StepStatus,
    },
    InterruptRecorded {
        thread_id: String,
        interrupt_type: InterruptType,
        reason: String,
    },
    InterruptResumed {
        thread_id: String,
        interrupt_type: InterruptType,
    },
    RunFinished {
        thread_id: String,
        status: TaskStatus,
    },
}

/// 事件出口：实现方自行决定缓冲 / 丢弃，emit 不允许失败
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OrchestratorEvent);
}

/// 丢弃所有事件（默认）
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: OrchestratorEvent) {}
}

/// 无界通道出口：接收端关闭时静默丢弃
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::UnboundedSender<OrchestratorEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: OrchestratorEvent) {
        let _ = self.tx.send(event);
    }
}
