//! Agent 错误类型与恢复动作
//!
//! 分类：Dispatch（指令内容缺失）、上游（LLM / 工具失败或超时）、持久化、循环守卫、取消。
//! 解析降级不在此列：解析器本地吞掉畸形输入，永不向上抛错。

use thiserror::Error;

use crate::llm::LlmError;

/// 编排循环中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 委派类指令（search_agent / writing_agent）内容为空
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// 会话在 max_turns 轮内没有出现终止指令
    #[error("{agent} reached the turn limit ({max_turns}) without a terminal directive")]
    LoopGuardTripped { agent: String, max_turns: usize },

    #[error("Cancelled")]
    Cancelled,

    #[error("Task {0} is already running")]
    TaskBusy(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 上游类错误（LLM / 工具）可在调用边界有限次重试
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            AgentError::Llm(_) | AgentError::ToolExecutionFailed(_) | AgentError::ToolTimeout(_)
        )
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 本轮输入以一条用户可见的失败消息结束，会话继续可用
    NotifyUser(String),
    /// 终止会话（取消、配置错误等）
    Abort,
}
