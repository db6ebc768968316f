//! 注册表持久化
//!
//! 每次变更后整表写入 JSON 文件，启动时加载；文件不存在返回空表。
//! MemoryRegistryStore 供测试使用。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::HiveError;
use crate::registry::RegisteredAgent;

/// 注册表存储接口：整表读写
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<Vec<RegisteredAgent>, HiveError>;
    fn save(&self, agents: &[RegisteredAgent]) -> Result<(), HiveError>;
}

/// 单文件 JSON 持久化；父目录不存在时自动创建
#[derive(Debug)]
pub struct FileRegistryStore {
    path: PathBuf,
}

impl FileRegistryStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RegistryStore for FileRegistryStore {
    fn load(&self) -> Result<Vec<RegisteredAgent>, HiveError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .map_err(|e| HiveError::Persistence(format!("read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| HiveError::Persistence(format!("parse {}: {}", self.path.display(), e)))
    }

    fn save(&self, agents: &[RegisteredAgent]) -> Result<(), HiveError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                HiveError::Persistence(format!("create {}: {}", parent.display(), e))
            })?;
        }
        let data = serde_json::to_string_pretty(agents)
            .map_err(|e| HiveError::Persistence(format!("serialize registry: {}", e)))?;
        std::fs::write(&self.path, data)
            .map_err(|e| HiveError::Persistence(format!("write {}: {}", self.path.display(), e)))
    }
}

/// 内存存储（测试用）
#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    agents: Mutex<Vec<RegisteredAgent>>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已保存的条目数（断言持久化发生过）
    pub fn saved_count(&self) -> usize {
        self.agents.lock().expect("store lock poisoned").len()
    }
}

impl RegistryStore for MemoryRegistryStore {
    fn load(&self) -> Result<Vec<RegisteredAgent>, HiveError> {
        Ok(self.agents.lock().expect("store lock poisoned").clone())
    }

    fn save(&self, agents: &[RegisteredAgent]) -> Result<(), HiveError> {
        *self.agents.lock().expect("store lock poisoned") = agents.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AgentCard;

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRegistryStore::new(dir.path().join("nested/registry.json"));

        assert!(store.load().unwrap().is_empty());

        let agents = vec![RegisteredAgent::new(
            "billing",
            "http://billing:8080",
            Some(AgentCard::new("billing").with_capability("invoice")),
        )];
        store.save(&agents).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "billing");
        assert!(loaded[0].has_capability("invoice"));
    }

    #[test]
    fn test_file_store_corrupt_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, "not json").unwrap();
        let store = FileRegistryStore::new(&path);
        assert_eq!(store.load().unwrap_err().kind(), "persistence_error");
    }
}
