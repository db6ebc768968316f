//! 注册表主体：能力路由与并发健康检查
//!
//! 表结构为 name -> Arc<RwLock<RegisteredAgent>>：外层读写锁只护映射本身，
//! 条目各有一把锁，单个 Agent 的探测 / 更新不会阻塞其他 Agent。
//! 健康检查经由 AgentClient（带熔断与超时），从不抛错，结果编码在
//! 返回值与存储的状态里。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::RwLock;

use crate::client::AgentClient;
use crate::error::HiveError;
use crate::protocol::AgentCard;
use crate::registry::{AgentStatus, RegisteredAgent, RegistryStore};

/// 注册表统计：按状态计数 + 能力全集
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total: usize,
    pub by_status: HashMap<&'static str, usize>,
    pub capabilities: BTreeSet<String>,
}

/// Agent 注册表
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<RwLock<RegisteredAgent>>>>,
    store: Arc<dyn RegistryStore>,
    client: Arc<dyn AgentClient>,
}

impl AgentRegistry {
    /// 构造时先从存储加载整表，加载完成前不对外提供操作
    pub fn new(
        store: Arc<dyn RegistryStore>,
        client: Arc<dyn AgentClient>,
    ) -> Result<Self, HiveError> {
        let loaded = store.load()?;
        let mut map = HashMap::new();
        for agent in loaded {
            map.insert(agent.name.clone(), Arc::new(RwLock::new(agent)));
        }
        tracing::info!(agents = map.len(), "agent registry loaded");
        Ok(Self {
            agents: RwLock::new(map),
            store,
            client,
        })
    }

    /// 注册（或整条覆盖）一个 Agent，状态置 unknown，立即落盘
    pub async fn register(
        &self,
        name: &str,
        endpoint: &str,
        card: Option<AgentCard>,
    ) -> Result<(), HiveError> {
        let agent = RegisteredAgent::new(name, endpoint, card);
        self.agents
            .write()
            .await
            .insert(name.to_string(), Arc::new(RwLock::new(agent)));
        tracing::info!(name, endpoint, "agent registered");
        self.persist().await
    }

    /// 注销；存在且移除成功时落盘
    pub async fn unregister(&self, name: &str) -> Result<bool, HiveError> {
        let removed = self.agents.write().await.remove(name).is_some();
        if removed {
            tracing::info!(name, "agent unregistered");
            self.persist().await?;
        }
        Ok(removed)
    }

    /// 全部声明了指定能力的条目（不做额外排序）
    pub async fn find_by_capability(&self, capability: &str) -> Vec<RegisteredAgent> {
        let mut found = Vec::new();
        for entry in self.entries().await {
            let agent = entry.read().await;
            if agent.has_capability(capability) {
                found.push(agent.clone());
            }
        }
        found
    }

    /// 按要求能力（超集匹配）或任务描述关键词挑一个在线 Agent
    pub async fn find_best_agent(
        &self,
        task_description: &str,
        required_capabilities: Option<&[String]>,
    ) -> Option<RegisteredAgent> {
        let entries = self.entries().await;

        if let Some(required) = required_capabilities {
            if !required.is_empty() {
                for entry in &entries {
                    let agent = entry.read().await;
                    if agent.is_online() && agent.covers_all(required) {
                        return Some(agent.clone());
                    }
                }
                return None;
            }
        }

        // 关键词回退：任务描述分词后与能力 / 名称 / 描述做大小写无关包含匹配
        let words: Vec<String> = task_description
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| w.len() >= 3)
            .collect();
        for entry in &entries {
            let agent = entry.read().await;
            if agent.is_online() && Self::keyword_match(&agent, &words) {
                return Some(agent.clone());
            }
        }
        None
    }

    fn keyword_match(agent: &RegisteredAgent, words: &[String]) -> bool {
        let mut haystack: Vec<String> = vec![agent.name.to_lowercase()];
        if let Some(card) = &agent.agent_card {
            haystack.push(card.description.to_lowercase());
            haystack.extend(card.capabilities.iter().map(|c| c.to_lowercase()));
        }
        words
            .iter()
            .any(|w| haystack.iter().any(|h| h.contains(w)))
    }

    /// 探测单个 Agent 并立即落盘；返回是否在线
    pub async fn health_check_one(&self, name: &str) -> bool {
        let Some(entry) = self.agents.read().await.get(name).cloned() else {
            return false;
        };
        let online = Self::probe_and_update(&self.client, &entry).await;
        if let Err(e) = self.persist().await {
            tracing::warn!(name, error = %e, "failed to persist registry after health check");
        }
        online
    }

    /// 并发探测所有 Agent，互不影响，结束后整表落盘一次
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let snapshot: Vec<(String, Arc<RwLock<RegisteredAgent>>)> = self
            .agents
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect();

        let probes = snapshot.into_iter().map(|(name, entry)| {
            let client = self.client.clone();
            async move {
                let online = Self::probe_and_update(&client, &entry).await;
                (name, online)
            }
        });
        let results: HashMap<String, bool> = join_all(probes).await.into_iter().collect();

        if let Err(e) = self.persist().await {
            tracing::warn!(error = %e, "failed to persist registry after health sweep");
        }
        tracing::info!(
            online = results.values().filter(|v| **v).count(),
            total = results.len(),
            "health sweep finished"
        );
        results
    }

    /// 单个条目的探测 + 更新：持条目写锁完成，保证无交错的半更新
    async fn probe_and_update(
        client: &Arc<dyn AgentClient>,
        entry: &Arc<RwLock<RegisteredAgent>>,
    ) -> bool {
        let mut agent = entry.write().await;
        let endpoint = agent.endpoint.clone();
        match client.fetch_card(&endpoint).await {
            Ok(card) => {
                agent.agent_card = Some(card);
                agent.status = AgentStatus::Online;
                agent.last_health_check = Some(Utc::now());
                true
            }
            Err(e) => {
                agent.status = match e {
                    HiveError::Protocol { .. } => AgentStatus::Error,
                    _ => AgentStatus::Offline,
                };
                agent.last_health_check = Some(Utc::now());
                tracing::debug!(name = %agent.name, error = %e, "health probe failed");
                false
            }
        }
    }

    /// 探测候选端点并注册应答者；返回新注册数量，未应答的端点静默跳过
    pub async fn discover(&self, endpoints: &[String]) -> usize {
        let mut newly_registered = 0;
        let mut changed = false;
        for endpoint in endpoints {
            let card = match self.client.fetch_card(endpoint).await {
                Ok(card) => card,
                Err(e) => {
                    tracing::debug!(endpoint, error = %e, "discovery probe unanswered");
                    continue;
                }
            };
            let name = card.name.clone();
            let is_new = !self.agents.read().await.contains_key(&name);
            let mut agent = RegisteredAgent::new(&name, endpoint, Some(card));
            agent.status = AgentStatus::Online;
            agent.last_health_check = Some(Utc::now());
            self.agents
                .write()
                .await
                .insert(name.clone(), Arc::new(RwLock::new(agent)));
            changed = true;
            if is_new {
                newly_registered += 1;
            }
            tracing::info!(name, endpoint, "agent discovered");
        }
        // 重复发现也会覆盖条目（新卡片、状态置 online），同样要落盘
        if changed {
            if let Err(e) = self.persist().await {
                tracing::warn!(error = %e, "failed to persist registry after discovery");
            }
        }
        newly_registered
    }

    /// 条目快照列表
    pub async fn list(&self) -> Vec<RegisteredAgent> {
        let mut agents = Vec::new();
        for entry in self.entries().await {
            agents.push(entry.read().await.clone());
        }
        agents
    }

    /// 按名称取条目快照
    pub async fn get(&self, name: &str) -> Option<RegisteredAgent> {
        let entry = self.agents.read().await.get(name).cloned()?;
        let agent = entry.read().await.clone();
        Some(agent)
    }

    /// 统计：总数、按状态计数、能力全集
    pub async fn stats(&self) -> RegistryStats {
        let mut by_status: HashMap<&'static str, usize> = HashMap::new();
        let mut capabilities = BTreeSet::new();
        let mut total = 0;
        for entry in self.entries().await {
            let agent = entry.read().await;
            total += 1;
            *by_status.entry(agent.status.as_str()).or_insert(0) += 1;
            if let Some(card) = &agent.agent_card {
                capabilities.extend(card.capabilities.iter().cloned());
            }
        }
        RegistryStats {
            total,
            by_status,
            capabilities,
        }
    }

    async fn entries(&self) -> Vec<Arc<RwLock<RegisteredAgent>>> {
        self.agents.read().await.values().cloned().collect()
    }

    async fn persist(&self) -> Result<(), HiveError> {
        let snapshot = self.list().await;
        self.store.save(&snapshot)
    }
}
