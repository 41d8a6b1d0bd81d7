//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容端点 / 脚本化 Mock）实现 LlmClient::complete。
//! 客户端本身不重试；RetryingLlmClient 在模型调用边界施加单次超时与有限次退避重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{retry_with_backoff, RetryConfig};
use crate::memory::Message;

/// 模型调用错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited (retry after {retry_after_ms}ms)")]
    RateLimited { retry_after_ms: u64 },

    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("model returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 超时、限流、网络抖动、空回复可重试；API 参数/鉴权错误不重试
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::ApiError(_))
    }
}

/// LLM 客户端 trait：给定完整消息列表（含 system），返回助手回复文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 为任意 LlmClient 增加单次请求超时与退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    retry: RetryConfig,
    timeout: Duration,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            inner,
            retry,
            timeout,
        }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let inner = &self.inner;
        let limit = self.timeout;
        retry_with_backoff(&self.retry, "llm.complete", || async move {
            match tokio::time::timeout(limit, inner.complete(messages)).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(limit.as_secs())),
            }
        })
        .await
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retrying_client_recovers_from_transient_error() {
        let scripted = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        scripted.push_error(LlmError::Network("connection reset".into()));
        scripted.push_reply("done");
        let client = RetryingLlmClient::new(scripted.clone(), fast_retry(), Duration::from_secs(5));

        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(scripted.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retrying_client_does_not_retry_api_error() {
        let scripted = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        scripted.push_error(LlmError::ApiError("invalid api key".into()));
        scripted.push_reply("never reached");
        let client = RetryingLlmClient::new(scripted.clone(), fast_retry(), Duration::from_secs(5));

        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::ApiError(_)));
        assert_eq!(scripted.call_count(), 1);
    }
}
