//! 中断协调
//!
//! 跟踪每个 thread 的挂起请求，区分来源（human_input / user_escape），
//! 并在两种来源撞车时裁决：用户中止永远赢过步骤的澄清请求，避免把过期的
//! 澄清问题展示给已经要求中止的用户。撞车裁决只记日志，不是错误。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::HiveError;
use crate::events::{EventSink, OrchestratorEvent};
use crate::workflow::checkpoint::CheckpointStore;
use crate::workflow::state::{InterruptContext, InterruptType, PlanExecuteState};

/// interrupt_task 的应答
#[derive(Debug, Clone)]
pub struct InterruptAck {
    pub success: bool,
    pub message: String,
}

/// 中断协调器：内存中的挂起标记 + 持久化的 InterruptContext
pub struct InterruptCoordinator {
    store: Arc<dyn CheckpointStore>,
    events: Arc<dyn EventSink>,
    /// thread_id -> 中止理由；在执行步骤察觉之前写入
    pending_escapes: RwLock<HashMap<String, String>>,
}

impl InterruptCoordinator {
    pub fn new(store: Arc<dyn CheckpointStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            pending_escapes: RwLock::new(HashMap::new()),
        }
    }

    /// 用户发起中止 / 修改；幂等——同一 thread 已有挂起中断时是 no-op 成功
    pub async fn interrupt_task(&self, thread_id: &str, reason: &str) -> InterruptAck {
        {
            let mut pending = self.pending_escapes.write().await;
            if pending.contains_key(thread_id) {
                return InterruptAck {
                    success: true,
                    message: format!("interrupt already pending for thread {}", thread_id),
                };
            }
            pending.insert(thread_id.to_string(), reason.to_string());
        }
        tracing::info!(thread_id, reason, "user escape requested");

        // 线程已停在 human_input 上时，整体替换存储的上下文为 user_escape
        match self.store.load_interrupt(thread_id).await {
            Ok(Some(mut ctx)) => {
                ctx.interrupt_type = InterruptType::UserEscape;
                ctx.reason = reason.to_string();
                ctx.interrupt_time = chrono::Utc::now();
                if let Err(e) = self.store.save_interrupt(&ctx).await {
                    tracing::warn!(thread_id, error = %e, "failed to replace interrupt context");
                } else {
                    self.events.emit(OrchestratorEvent::InterruptRecorded {
                        thread_id: thread_id.to_string(),
                        interrupt_type: InterruptType::UserEscape,
                        reason: reason.to_string(),
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(thread_id, error = %e, "failed to load interrupt context");
            }
        }

        InterruptAck {
            success: true,
            message: format!("interrupt recorded for thread {}", thread_id),
        }
    }

    /// 当前是否有未消费的 user_escape
    pub async fn pending_escape(&self, thread_id: &str) -> Option<String> {
        self.pending_escapes.read().await.get(thread_id).cloned()
    }

    /// 挂起点记录 InterruptContext（整体替换同 thread 的旧记录）
    ///
    /// 撞车规则：即将记录 human_input 时若 user_escape 已挂起（或状态上已
    /// 置位），强制改记 user_escape，丢弃澄清问题。
    pub async fn record_suspension(
        &self,
        state: &mut PlanExecuteState,
        requested: InterruptType,
        reason: &str,
    ) -> Result<InterruptContext, HiveError> {
        let pending = self.pending_escapes.write().await.remove(&state.thread_id);

        let (interrupt_type, reason) = match requested {
            InterruptType::UserEscape => (InterruptType::UserEscape, reason.to_string()),
            InterruptType::HumanInput => {
                if let Some(escape_reason) =
                    pending.or_else(|| state.user_interrupted.then(|| {
                        state
                            .interrupt_reason
                            .clone()
                            .unwrap_or_else(|| "user requested abort".to_string())
                    }))
                {
                    tracing::info!(
                        thread_id = %state.thread_id,
                        discarded_question = reason,
                        "interrupt clash resolved in favor of user escape"
                    );
                    (InterruptType::UserEscape, escape_reason)
                } else {
                    (InterruptType::HumanInput, reason.to_string())
                }
            }
        };

        if interrupt_type == InterruptType::UserEscape {
            state.mark_user_interrupted(&reason);
        }

        let ctx = InterruptContext::from_state(state, interrupt_type, &reason);
        self.store.save_interrupt(&ctx).await?;
        self.events.emit(OrchestratorEvent::InterruptRecorded {
            thread_id: ctx.thread_id.clone(),
            interrupt_type: ctx.interrupt_type,
            reason: ctx.reason.clone(),
        });
        tracing::info!(
            thread_id = %ctx.thread_id,
            interrupt_type = ctx.interrupt_type.as_str(),
            completed = ctx.completed_steps,
            total = ctx.total_steps,
            "execution suspended"
        );
        Ok(ctx)
    }

    /// 读取挂起的上下文（resume 入口用）
    pub async fn load_context(&self, thread_id: &str) -> Result<Option<InterruptContext>, HiveError> {
        self.store.load_interrupt(thread_id).await
    }

    /// 恢复的运行成功重新跑起来之后才调用：清掉上下文与挂起标记
    pub async fn clear_after_restart(&self, thread_id: &str, interrupt_type: InterruptType) {
        self.pending_escapes.write().await.remove(thread_id);
        if let Err(e) = self.store.clear_interrupt(thread_id).await {
            tracing::warn!(thread_id, error = %e, "failed to clear interrupt context");
        }
        self.events.emit(OrchestratorEvent::InterruptResumed {
            thread_id: thread_id.to_string(),
            interrupt_type,
        });
    }
}
