//! 检查点存储
//!
//! 挂起点把 PlanExecuteState 与 InterruptContext 落盘，resume 从记录重建
//! 内存执行，不依赖任何运行时续体。文件实现按 thread_id 分文件存 JSON，
//! 内存实现供测试。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::HiveError;
use crate::workflow::state::{InterruptContext, PlanExecuteState};

/// 按 thread_id 读写检查点的 k/v 接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save_state(&self, state: &PlanExecuteState) -> Result<(), HiveError>;
    async fn load_state(&self, thread_id: &str) -> Result<Option<PlanExecuteState>, HiveError>;
    async fn save_interrupt(&self, ctx: &InterruptContext) -> Result<(), HiveError>;
    async fn load_interrupt(&self, thread_id: &str) -> Result<Option<InterruptContext>, HiveError>;
    async fn clear_interrupt(&self, thread_id: &str) -> Result<(), HiveError>;
}

/// 目录式文件存储：<dir>/<thread_id>.state.json 与 <dir>/<thread_id>.interrupt.json
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn state_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.state.json", thread_id))
    }

    fn interrupt_path(&self, thread_id: &str) -> PathBuf {
        self.dir.join(format!("{}.interrupt.json", thread_id))
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<(), HiveError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| HiveError::Persistence(format!("create {}: {}", self.dir.display(), e)))?;
        let data = serde_json::to_string_pretty(value)
            .map_err(|e| HiveError::Persistence(format!("serialize checkpoint: {}", e)))?;
        std::fs::write(path, data)
            .map_err(|e| HiveError::Persistence(format!("write {}: {}", path.display(), e)))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, HiveError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| HiveError::Persistence(format!("read {}: {}", path.display(), e)))?;
        // 文件存在但解析失败 = 持久化状态损坏，视为不变量被破坏
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| HiveError::InvalidState(format!("corrupt checkpoint {}: {}", path.display(), e)))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_state(&self, state: &PlanExecuteState) -> Result<(), HiveError> {
        self.write_json(&self.state_path(&state.thread_id), state)
    }

    async fn load_state(&self, thread_id: &str) -> Result<Option<PlanExecuteState>, HiveError> {
        Self::read_json(&self.state_path(thread_id))
    }

    async fn save_interrupt(&self, ctx: &InterruptContext) -> Result<(), HiveError> {
        self.write_json(&self.interrupt_path(&ctx.thread_id), ctx)
    }

    async fn load_interrupt(&self, thread_id: &str) -> Result<Option<InterruptContext>, HiveError> {
        Self::read_json(&self.interrupt_path(thread_id))
    }

    async fn clear_interrupt(&self, thread_id: &str) -> Result<(), HiveError> {
        let path = self.interrupt_path(thread_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| HiveError::Persistence(format!("remove {}: {}", path.display(), e)))?;
        }
        Ok(())
    }
}

/// 内存存储（测试用）
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, PlanExecuteState>>,
    interrupts: Mutex<HashMap<String, InterruptContext>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save_state(&self, state: &PlanExecuteState) -> Result<(), HiveError> {
        self.states
            .lock()
            .expect("checkpoint lock poisoned")
            .insert(state.thread_id.clone(), state.clone());
        Ok(())
    }

    async fn load_state(&self, thread_id: &str) -> Result<Option<PlanExecuteState>, HiveError> {
        Ok(self
            .states
            .lock()
            .expect("checkpoint lock poisoned")
            .get(thread_id)
            .cloned())
    }

    async fn save_interrupt(&self, ctx: &InterruptContext) -> Result<(), HiveError> {
        self.interrupts
            .lock()
            .expect("checkpoint lock poisoned")
            .insert(ctx.thread_id.clone(), ctx.clone());
        Ok(())
    }

    async fn load_interrupt(&self, thread_id: &str) -> Result<Option<InterruptContext>, HiveError> {
        Ok(self
            .interrupts
            .lock()
            .expect("checkpoint lock poisoned")
            .get(thread_id)
            .cloned())
    }

    async fn clear_interrupt(&self, thread_id: &str) -> Result<(), HiveError> {
        self.interrupts
            .lock()
            .expect("checkpoint lock poisoned")
            .remove(thread_id);
        Ok(())
    }
}
