//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 触发 CancellationToken；正在运行的会话在当前挂起点（模型调用、
//! 工具调用、持久化写入）观察到取消后退出，不追加半条对话、不留下半写文档。

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户中断（Ctrl+C）
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 致命错误
    FatalError(String),
}

/// 持有全局取消令牌，记录第一次关闭的原因
#[derive(Debug, Default)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 会话共用的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 取消所有挂起的调用；重复调用只保留第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if let Ok(mut slot) = self.reason.lock() {
            if slot.is_none() {
                tracing::info!(reason = ?reason, "shutting down");
                *slot = Some(reason);
            }
        }
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_cancels_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!token.is_cancelled());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(manager.is_shutdown());
    }

    #[test]
    fn test_first_reason_wins() {
        let manager = ShutdownManager::new();
        manager.shutdown(ShutdownReason::FatalError("disk full".into()));
        manager.shutdown(ShutdownReason::Signal);
        assert_eq!(
            manager.reason(),
            Some(ShutdownReason::FatalError("disk full".into()))
        );
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_returns_after_cancel() {
        let manager = Arc::new(ShutdownManager::new());
        let waiter = {
            let m = Arc::clone(&manager);
            tokio::spawn(async move { m.wait_for_shutdown().await })
        };
        manager.shutdown(ShutdownReason::Signal);
        waiter.await.unwrap();
    }
}
