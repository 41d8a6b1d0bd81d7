//! 上游调用的有限次重试与指数退避
//!
//! LLM 与工具网关自身不重试；重试策略由调用方（RetryingLlmClient、各会话循环）通过
//! retry_with_backoff 施加。只有 Retryable::is_retryable 为 true 的错误才会重试。

use std::future::Future;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::LlmError;

/// 错误是否值得重试
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }
}

impl Retryable for AgentError {
    fn is_retryable(&self) -> bool {
        match self {
            AgentError::Llm(e) => e.is_retryable(),
            AgentError::ToolExecutionFailed(_) | AgentError::ToolTimeout(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数（含首次），至少为 1
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    /// 不重试（测试与一次性调用）
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 第 attempt 次失败后的等待时间：initial * 2^(attempt-1)，封顶 max_backoff
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

/// 执行 op，遇到可重试错误时按退避等待后重试，直至成功或次数用尽
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                let wait = config.backoff_for(attempt);
                tracing::warn!(
                    op = label,
                    attempt,
                    max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %e,
                    "upstream call failed, retrying"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let cfg = RetryConfig {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
        };
        assert_eq!(cfg.backoff_for(1), Duration::from_millis(100));
        assert_eq!(cfg.backoff_for(2), Duration::from_millis(200));
        assert_eq!(cfg.backoff_for(3), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<&str, AgentError> = retry_with_backoff(&fast(), "test", || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AgentError::ToolTimeout("search".into()))
            } else {
                Ok("ok")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), AgentError> = retry_with_backoff(&fast(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::ToolExecutionFailed("boom".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), AgentError> = retry_with_backoff(&fast(), "test", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AgentError::Dispatch("empty".into()))
        })
        .await;
        assert!(matches!(result, Err(AgentError::Dispatch(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
