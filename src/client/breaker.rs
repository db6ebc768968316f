//! 每端点熔断器
//!
//! 三态：closed 计数连续失败，达阈值转 open；open 直接拒绝，超时后转 half_open；
//! half_open 只放行一个试探调用，成功回 closed 清零计数，失败回 open 重置 opened_at。
//! 每个端点一把锁，互不阻塞。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use crate::error::HiveError;

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// 放行类型：正常放行 or half_open 试探（试探不做重试）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerPass {
    Normal,
    Trial,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// half_open 下是否已有试探在途
    trial_inflight: bool,
    /// 试探放行时刻；在途试探超过 open_timeout 未上报结果视为被放弃
    trial_started_at: Option<Instant>,
}

/// 单端点熔断器
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    threshold: u32,
    open_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, threshold: u32, open_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            threshold: threshold.max(1),
            open_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                trial_inflight: false,
                trial_started_at: None,
            }),
        }
    }

    /// 调用前检查：open 且未到期直接拒绝；到期转 half_open 并放行唯一试探
    pub fn try_acquire(&self) -> Result<BreakerPass, HiveError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => Ok(BreakerPass::Normal),
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.open_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_inflight = true;
                    inner.trial_started_at = Some(Instant::now());
                    tracing::info!(endpoint = %self.endpoint, "circuit breaker half-open, allowing trial call");
                    Ok(BreakerPass::Trial)
                } else {
                    Err(HiveError::BreakerOpen(self.endpoint.clone()))
                }
            }
            BreakerState::HalfOpen => {
                // 调用方可能在上报结果前被取消；过期的在途试探让位给新试探
                let trial_expired = inner
                    .trial_started_at
                    .map(|t| t.elapsed() >= self.open_timeout)
                    .unwrap_or(true);
                if inner.trial_inflight && !trial_expired {
                    Err(HiveError::BreakerOpen(self.endpoint.clone()))
                } else {
                    inner.trial_inflight = true;
                    inner.trial_started_at = Some(Instant::now());
                    Ok(BreakerPass::Trial)
                }
            }
        }
    }

    /// 上报最终成功：回 closed 并清零失败计数
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if inner.state != BreakerState::Closed {
            tracing::info!(endpoint = %self.endpoint, "circuit breaker closed after successful call");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
        inner.trial_inflight = false;
        inner.trial_started_at = None;
    }

    /// 上报最终失败：closed 下计数，达阈值转 open；half_open 试探失败回 open
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        failures = inner.consecutive_failures,
                        "circuit breaker opened"
                    );
                }
            }
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.trial_inflight = false;
                inner.trial_started_at = None;
                tracing::warn!(endpoint = %self.endpoint, "circuit breaker re-opened after failed trial");
            }
        }
    }

    /// 当前状态（测试与观测用）
    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .consecutive_failures
    }
}

/// 熔断器注册表：按端点惰性创建，外层读写锁只护映射本身
#[derive(Debug)]
pub struct BreakerRegistry {
    threshold: u32,
    open_timeout: Duration,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(threshold: u32, open_timeout: Duration) -> Self {
        Self {
            threshold,
            open_timeout,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// 取端点对应的熔断器，不存在则创建
    pub fn for_endpoint(&self, endpoint: &str) -> Arc<CircuitBreaker> {
        if let Some(b) = self
            .breakers
            .read()
            .expect("breaker registry lock poisoned")
            .get(endpoint)
        {
            return b.clone();
        }
        let mut map = self
            .breakers
            .write()
            .expect("breaker registry lock poisoned");
        map.entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(endpoint, self.threshold, self.open_timeout))
            })
            .clone()
    }
}
