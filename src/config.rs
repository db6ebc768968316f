//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，
//! 如 `HIVE__CLIENT__RETRY_ATTEMPTS=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub workflow: WorkflowSection,
}

/// [app] 段：应用名与数据目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 注册表与检查点的落盘根目录，未设置时用 ./data
    pub data_root: Option<PathBuf>,
}

/// [client] 段：弹性通信层的超时、重试、熔断与连接池参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// 建连超时（秒），与完整响应超时分开预算
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// 完整响应超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 传输类失败的重试次数（固定间隔，不做指数退避）
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// 重试固定间隔（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// 连续失败多少次后熔断
    #[serde(default = "default_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// 熔断打开后多久进入半开（秒）
    #[serde(default = "default_breaker_timeout_secs")]
    pub circuit_breaker_timeout_secs: u64,
    #[serde(default)]
    pub pool: PoolSection,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_breaker_threshold() -> u32 {
    5
}

fn default_breaker_timeout_secs() -> u64 {
    30
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            circuit_breaker_threshold: default_breaker_threshold(),
            circuit_breaker_timeout_secs: default_breaker_timeout_secs(),
            pool: PoolSection::default(),
        }
    }
}

/// [client.pool] 段：按 host 复用连接的池参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSection {
    /// 池内槽位上限
    #[serde(default = "default_pool_max_size")]
    pub max_size: usize,
    /// 池满后允许的溢出连接数（硬上限 = max_size + max_overflow）
    #[serde(default = "default_pool_max_overflow")]
    pub max_overflow: usize,
    /// 池满时等待空闲槽位的时长（毫秒），超过则走溢出或失败
    #[serde(default = "default_pool_acquire_wait_ms")]
    pub acquire_wait_ms: u64,
    /// 连接最大存活时长（秒）
    #[serde(default = "default_pool_ttl_secs")]
    pub ttl_secs: u64,
    /// 连接最大空闲时长（秒）
    #[serde(default = "default_pool_max_idle_secs")]
    pub max_idle_secs: u64,
    /// 后台清扫间隔（秒）
    #[serde(default = "default_pool_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_pool_max_size() -> usize {
    10
}

fn default_pool_max_overflow() -> usize {
    5
}

fn default_pool_acquire_wait_ms() -> u64 {
    200
}

fn default_pool_ttl_secs() -> u64 {
    300
}

fn default_pool_max_idle_secs() -> u64 {
    60
}

fn default_pool_sweep_interval_secs() -> u64 {
    30
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_size: default_pool_max_size(),
            max_overflow: default_pool_max_overflow(),
            acquire_wait_ms: default_pool_acquire_wait_ms(),
            ttl_secs: default_pool_ttl_secs(),
            max_idle_secs: default_pool_max_idle_secs(),
            sweep_interval_secs: default_pool_sweep_interval_secs(),
        }
    }
}

/// [registry] 段：注册表持久化与发现
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegistrySection {
    /// 注册表落盘文件，未设置时用 <data_root>/registry.json
    pub store_path: Option<PathBuf>,
    /// 启动时探测的候选端点（discover 用）
    #[serde(default)]
    pub discover_endpoints: Vec<String>,
}

/// [workflow] 段：Plan-Execute 执行参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowSection {
    /// 单个计划的最大步数，防止死循环
    #[serde(default = "default_max_plan_steps")]
    pub max_plan_steps: usize,
    /// 检查点落盘目录，未设置时用 <data_root>/checkpoints
    pub checkpoint_dir: Option<PathBuf>,
}

fn default_max_plan_steps() -> usize {
    50
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_plan_steps: default_max_plan_steps(),
            checkpoint_dir: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSection::default(),
            client: ClientSection::default(),
            registry: RegistrySection::default(),
            workflow: WorkflowSection::default(),
        }
    }
}

impl AppConfig {
    /// 数据根目录（默认 ./data）
    pub fn data_root(&self) -> PathBuf {
        self.app
            .data_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    /// 注册表落盘文件路径
    pub fn registry_store_path(&self) -> PathBuf {
        self.registry
            .store_path
            .clone()
            .unwrap_or_else(|| self.data_root().join("registry.json"))
    }

    /// 检查点落盘目录
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.workflow
            .checkpoint_dir
            .clone()
            .unwrap_or_else(|| self.data_root().join("checkpoints"))
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// config_path 为 None 时尝试 config/default.toml 与 ../config/default.toml。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    match &config_path {
        None => {
            for name in ["config/default", "../config/default"] {
                builder = builder.add_source(config::File::with_name(name).required(false));
            }
        }
        Some(path) => {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.client.circuit_breaker_threshold, 5);
        assert_eq!(cfg.client.retry_attempts, 2);
        assert_eq!(cfg.client.pool.max_size, 10);
        assert_eq!(cfg.workflow.max_plan_steps, 50);
    }

    #[test]
    fn test_derived_paths() {
        let cfg = AppConfig::default();
        assert!(cfg.registry_store_path().ends_with("registry.json"));
        assert!(cfg.checkpoint_dir().ends_with("checkpoints"));
    }
}
