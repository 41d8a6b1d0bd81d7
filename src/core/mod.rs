//! 核心层：错误分类与恢复、重试退避、优雅关闭

pub mod error;
pub mod recovery;
pub mod retry;
pub mod shutdown;

pub use error::{AgentError, RecoveryAction};
pub use recovery::RecoveryEngine;
pub use retry::{retry_with_backoff, RetryConfig, Retryable};
pub use shutdown::{ShutdownManager, ShutdownReason};
