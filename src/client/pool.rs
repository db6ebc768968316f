//! 按 host 复用的出站连接池
//!
//! 槽位由 Semaphore 统一记账（池级锁只管记账，连接取出后无锁使用）；
//! 池满时先短暂等待空闲槽位，再走受限的溢出额度，额度用尽快速失败。
//! 后台清扫任务周期性驱逐超过 TTL 或空闲过久的连接。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::PoolSection;
use crate::error::HiveError;

/// 池内单条目：reqwest 内部持有实际 socket，池负责新鲜度记账
struct PoolEntry {
    client: reqwest::Client,
    created_at: Instant,
    last_used_at: Instant,
}

impl PoolEntry {
    fn is_stale(&self, ttl: Duration, max_idle: Duration) -> bool {
        self.created_at.elapsed() > ttl || self.last_used_at.elapsed() > max_idle
    }
}

/// 取出的连接：持有槽位许可（或溢出记账），Drop 时归还
pub struct PooledConnection {
    pub client: reqwest::Client,
    _permit: Option<OwnedSemaphorePermit>,
    overflow: Option<Arc<AtomicUsize>>,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(counter) = self.overflow.take() {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// 池运行时统计
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub pooled_hosts: usize,
    pub available_slots: usize,
    pub overflow_in_use: usize,
}

/// 连接池：host -> 条目，槽位上限 + 溢出硬上限
pub struct ConnectionPool {
    cfg: PoolSection,
    connect_timeout: Duration,
    request_timeout: Duration,
    entries: Mutex<HashMap<String, PoolEntry>>,
    slots: Arc<Semaphore>,
    overflow_in_use: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl ConnectionPool {
    /// 创建连接池并启动后台清扫任务
    pub fn new(cfg: PoolSection, connect_timeout: Duration, request_timeout: Duration) -> Arc<Self> {
        let pool = Arc::new(Self {
            slots: Arc::new(Semaphore::new(cfg.max_size.max(1))),
            overflow_in_use: Arc::new(AtomicUsize::new(0)),
            entries: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            connect_timeout,
            request_timeout,
            cfg,
        });

        let sweeper = pool.clone();
        let interval = Duration::from_secs(sweeper.cfg.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            // 首个 tick 推迟一个完整周期，不在启动瞬间清扫
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            loop {
                tokio::select! {
                    _ = sweeper.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = sweeper.evict_stale().await;
                        if evicted > 0 {
                            tracing::debug!(evicted, "connection pool sweep");
                        }
                    }
                }
            }
        });

        pool
    }

    /// 取一个到指定 host 的连接：新鲜则复用，过期或缺失则新建
    pub async fn acquire(&self, host: &str) -> Result<PooledConnection, HiveError> {
        let (permit, overflow) = self.acquire_slot(host).await?;

        let mut entries = self.entries.lock().await;
        let ttl = Duration::from_secs(self.cfg.ttl_secs);
        let max_idle = Duration::from_secs(self.cfg.max_idle_secs);

        let client = match entries.get_mut(host) {
            Some(entry) if !entry.is_stale(ttl, max_idle) => {
                entry.last_used_at = Instant::now();
                entry.client.clone()
            }
            _ => {
                let client = self.build_client()?;
                entries.insert(
                    host.to_string(),
                    PoolEntry {
                        client: client.clone(),
                        created_at: Instant::now(),
                        last_used_at: Instant::now(),
                    },
                );
                client
            }
        };

        Ok(PooledConnection {
            client,
            _permit: permit,
            overflow,
        })
    }

    /// 槽位记账：先 try，再限时等待，最后走溢出额度
    async fn acquire_slot(
        &self,
        host: &str,
    ) -> Result<(Option<OwnedSemaphorePermit>, Option<Arc<AtomicUsize>>), HiveError> {
        if let Ok(permit) = self.slots.clone().try_acquire_owned() {
            return Ok((Some(permit), None));
        }

        let wait = Duration::from_millis(self.cfg.acquire_wait_ms);
        if let Ok(Ok(permit)) =
            tokio::time::timeout(wait, self.slots.clone().acquire_owned()).await
        {
            return Ok((Some(permit), None));
        }

        // 溢出额度：无槽位许可，仅计数限流
        let prev = self.overflow_in_use.fetch_add(1, Ordering::SeqCst);
        if prev >= self.cfg.max_overflow {
            self.overflow_in_use.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(host, "connection pool exhausted (overflow ceiling reached)");
            return Err(HiveError::PoolExhausted(host.to_string()));
        }
        Ok((None, Some(self.overflow_in_use.clone())))
    }

    fn build_client(&self) -> Result<reqwest::Client, HiveError> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| HiveError::Transport(format!("failed to build client: {}", e)))
    }

    /// 驱逐过期 / 过闲条目，返回驱逐数量
    pub async fn evict_stale(&self) -> usize {
        let ttl = Duration::from_secs(self.cfg.ttl_secs);
        let max_idle = Duration::from_secs(self.cfg.max_idle_secs);
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| !e.is_stale(ttl, max_idle));
        before - entries.len()
    }

    pub async fn stats(&self) -> PoolStats {
        PoolStats {
            pooled_hosts: self.entries.lock().await.len(),
            available_slots: self.slots.available_permits(),
            overflow_in_use: self.overflow_in_use.load(Ordering::SeqCst),
        }
    }

    /// 停止后台清扫并清空条目
    pub async fn close(&self) {
        self.shutdown.cancel();
        self.entries.lock().await.clear();
    }
}
