//! 错误恢复引擎
//!
//! 调用方（REPL / 运行时）拿到 AgentError 后交给 RecoveryEngine：
//! 可恢复的错误转为一条用户可见消息，本轮结束但会话继续；其余终止会话。

use crate::core::{AgentError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::Dispatch(detail) => RecoveryAction::NotifyUser(format!(
                "无法委派子任务：{detail}。请补充任务说明后重试。"
            )),
            AgentError::Llm(e) => RecoveryAction::NotifyUser(format!(
                "模型调用失败（已重试）：{e}。请稍后重试。"
            )),
            AgentError::ToolExecutionFailed(msg) => {
                RecoveryAction::NotifyUser(format!("工具执行失败：{msg}"))
            }
            AgentError::ToolTimeout(tool) => {
                RecoveryAction::NotifyUser(format!("工具 {tool} 执行超时，请稍后重试。"))
            }
            AgentError::Persistence(msg) => {
                RecoveryAction::NotifyUser(format!("文档保存失败：{msg}"))
            }
            AgentError::LoopGuardTripped { agent, max_turns } => RecoveryAction::NotifyUser(
                format!("{agent} 在 {max_turns} 轮内未给出结论，已停止本轮任务。"),
            ),
            AgentError::Cancelled | AgentError::TaskBusy(_) | AgentError::ConfigError(_) => {
                RecoveryAction::Abort
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_dispatch_error_is_user_visible() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Dispatch("search_agent has no instruction".to_string());
        match engine.handle(&err) {
            RecoveryAction::NotifyUser(msg) => assert!(msg.contains("search_agent")),
            other => panic!("Expected NotifyUser, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_llm_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::Llm(LlmError::RateLimited { retry_after_ms: 1000 });
        assert!(matches!(engine.handle(&err), RecoveryAction::NotifyUser(_)));
    }

    #[test]
    fn test_recovery_loop_guard() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LoopGuardTripped {
            agent: "search_agent".to_string(),
            max_turns: 8,
        };
        match engine.handle(&err) {
            RecoveryAction::NotifyUser(msg) => assert!(msg.contains('8')),
            other => panic!("Expected NotifyUser, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_cancelled() {
        let engine = RecoveryEngine::new();
        assert!(matches!(engine.handle(&AgentError::Cancelled), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_task_busy() {
        let engine = RecoveryEngine::new();
        let err = AgentError::TaskBusy("20250101_120000".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }
}
