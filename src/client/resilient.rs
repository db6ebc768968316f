//! 弹性客户端：连接池 + 每端点熔断 + 固定间隔重试
//!
//! 每次调用：熔断器放行 -> 取池化连接 -> 发请求（建连与完整响应分开超时）->
//! 传输类失败按固定间隔重试 -> 只把最终结果上报熔断器。half_open 试探不重试。
//! 协议错误（对端返回 error 字段）说明链路可用，不计入熔断失败。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::client::breaker::{BreakerPass, BreakerRegistry};
use crate::client::pool::ConnectionPool;
use crate::client::AgentClient;
use crate::config::ClientSection;
use crate::error::HiveError;
use crate::protocol::{A2AResult, A2ATask, AgentCard, TaskRequest, TaskResponse, CARD_METHOD};

/// 生产实现：reqwest 传输，池与熔断注册表按依赖注入方式持有
pub struct ResilientClient {
    pool: Arc<ConnectionPool>,
    breakers: BreakerRegistry,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ResilientClient {
    pub fn new(cfg: &ClientSection) -> Self {
        let pool = ConnectionPool::new(
            cfg.pool.clone(),
            Duration::from_secs(cfg.connect_timeout_secs),
            Duration::from_secs(cfg.request_timeout_secs),
        );
        Self {
            pool,
            breakers: BreakerRegistry::new(
                cfg.circuit_breaker_threshold,
                Duration::from_secs(cfg.circuit_breaker_timeout_secs),
            ),
            retry_attempts: cfg.retry_attempts,
            retry_delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }

    /// 池中 key 用 host:port，端点解析失败视为传输错误
    fn host_key(endpoint: &str) -> Result<String, HiveError> {
        let url = reqwest::Url::parse(endpoint)
            .map_err(|e| HiveError::Transport(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| HiveError::Transport(format!("endpoint missing host: {}", endpoint)))?;
        Ok(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    /// 发送一次 JSON POST 并解析为 Value；网络失败归为传输错误
    async fn post_once(&self, endpoint: &str, body: &Value) -> Result<Value, HiveError> {
        let host = Self::host_key(endpoint)?;
        let conn = self.pool.acquire(&host).await?;
        let resp = conn
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| HiveError::Transport(format!("request to {} failed: {}", endpoint, e)))?;

        let status = resp.status();
        let value: Value = resp.json().await.map_err(|e| {
            HiveError::Transport(format!("reading response from {} failed: {}", endpoint, e))
        })?;

        // 非 2xx 且 body 不带 error 字段时，归为协议错误
        if !status.is_success() && value.get("error").is_none() {
            return Err(HiveError::Protocol {
                code: status.as_u16() as i64,
                message: format!("non-success response from {}", endpoint),
            });
        }
        Ok(value)
    }

    /// 带熔断与重试的调用骨架：decode 由调用方提供
    async fn call_with_resilience<T>(
        &self,
        endpoint: &str,
        body: Value,
        decode: impl Fn(Value) -> Result<T, HiveError>,
    ) -> Result<T, HiveError> {
        let breaker = self.breakers.for_endpoint(endpoint);
        let pass = breaker.try_acquire()?;
        let attempts = self.attempt_budget(pass);

        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay).await;
                tracing::debug!(endpoint, attempt, "retrying agent call");
            }
            match self.post_once(endpoint, &body).await {
                Ok(value) => match decode(value) {
                    Ok(parsed) => {
                        breaker.on_success();
                        return Ok(parsed);
                    }
                    Err(e) => {
                        // 响应完好但内容非法：链路健康，熔断按成功记
                        breaker.on_success();
                        return Err(e);
                    }
                },
                Err(e) if e.is_transport() && attempt + 1 < attempts => {
                    last_err = Some(e);
                }
                Err(e) => {
                    if e.is_transport() {
                        breaker.on_failure();
                    } else {
                        breaker.on_success();
                    }
                    return Err(e);
                }
            }
        }

        breaker.on_failure();
        Err(last_err.unwrap_or_else(|| HiveError::Transport("call failed".to_string())))
    }

    /// 总尝试次数 = 首次调用 + retry_attempts 次重试；half_open 试探只发一次
    fn attempt_budget(&self, pass: BreakerPass) -> u32 {
        match pass {
            BreakerPass::Trial => 1,
            BreakerPass::Normal => 1 + self.retry_attempts,
        }
    }

    /// 关闭底层连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// 池统计（观测用）
    pub async fn pool_stats(&self) -> crate::client::PoolStats {
        self.pool.stats().await
    }
}

#[async_trait]
impl AgentClient for ResilientClient {
    async fn call_task(&self, endpoint: &str, task: A2ATask) -> Result<A2AResult, HiveError> {
        let request = TaskRequest::execute(task)?;
        let body = serde_json::to_value(&request).map_err(|e| HiveError::Protocol {
            code: -32700,
            message: format!("failed to encode task request: {}", e),
        })?;
        self.call_with_resilience(endpoint, body, TaskResponse::decode)
            .await
    }

    async fn fetch_card(&self, endpoint: &str) -> Result<AgentCard, HiveError> {
        let body = json!({ "method": CARD_METHOD });
        self.call_with_resilience(endpoint, body, AgentCard::decode)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_with_and_without_port() {
        assert_eq!(
            ResilientClient::host_key("http://agent-a:8080/a2a").unwrap(),
            "agent-a:8080"
        );
        assert_eq!(
            ResilientClient::host_key("https://agents.example.com/a2a").unwrap(),
            "agents.example.com"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_transport_error() {
        let err = ResilientClient::host_key("not a url").unwrap_err();
        assert_eq!(err.kind(), "transport_error");
    }

    #[tokio::test]
    async fn test_attempt_budget_is_initial_call_plus_retries() {
        let mut cfg = ClientSection::default();
        cfg.retry_attempts = 2;
        let client = ResilientClient::new(&cfg);
        assert_eq!(client.attempt_budget(BreakerPass::Normal), 3);
        assert_eq!(client.attempt_budget(BreakerPass::Trial), 1);
        client.close().await;

        // retry_attempts = 0 表示只发首次调用，不重试
        cfg.retry_attempts = 0;
        let client = ResilientClient::new(&cfg);
        assert_eq!(client.attempt_budget(BreakerPass::Normal), 1);
        client.close().await;
    }
}
