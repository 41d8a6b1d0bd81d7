//! 任务工作区：按任务 ID 持久化对话快照与命名文档
//!
//! - FileWorkspace：`<tasks_root>/<task_id>/{chat_history,documents,logs}`，原子写入
//! - InMemoryWorkspace：测试与一次性运行用
//!
//! 同一任务同一时刻只允许一个会话进入（lock_task 返回 TaskGuard，Drop 时释放）。

pub mod fs;
pub mod lock;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::AgentError;

pub use fs::FileWorkspace;
pub use lock::{TaskGuard, TaskLocks};
pub use memory::InMemoryWorkspace;

/// 主控对话快照的文件名
pub const CONVERSATION_LOG: &str = "conversation.json";
/// 搜索子 Agent 对话快照
pub const SEARCH_AGENT_LOG: &str = "search_agent.json";
/// 写作子 Agent 对话快照
pub const WRITING_AGENT_LOG: &str = "writing_agent.json";
/// 主控的待办清单文档
pub const TODO_LIST: &str = "todo_list.md";

/// 存储条目的类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    /// 对话快照（chat_history/）
    ConversationLog,
    /// 命名文档（documents/）
    Document,
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("task {0} is already running")]
    TaskBusy(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<WorkspaceError> for AgentError {
    fn from(e: WorkspaceError) -> Self {
        match e {
            WorkspaceError::TaskBusy(task_id) => AgentError::TaskBusy(task_id),
            other => AgentError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait TaskWorkspace: Send + Sync {
    /// 创建或覆盖
    async fn save(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
        content: &str,
    ) -> Result<(), WorkspaceError>;

    async fn load(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
    ) -> Result<Option<String>, WorkspaceError>;

    /// 任务下所有文档名，按字典序
    async fn list_documents(&self, task_id: &str) -> Result<Vec<String>, WorkspaceError>;

    /// 独占任务；已有会话持有时返回 TaskBusy
    fn lock_task(&self, task_id: &str) -> Result<TaskGuard, WorkspaceError>;
}

/// 名字的最大字节数，给文件系统 255 字节的分量上限留出余量
pub const NAME_MAX_BYTES: usize = 200;

/// 校验名字只占一个路径分量（任务 ID 与文档名共用），拒绝路径逃逸与隐藏文件
pub fn validate_component(name: &str) -> Result<&str, WorkspaceError> {
    let trimmed = name.trim();
    let bad = trimmed.is_empty()
        || trimmed.starts_with('.')
        || trimmed.contains(['/', '\\', '\0'])
        || trimmed.contains("..")
        || trimmed.len() > NAME_MAX_BYTES;
    if bad {
        return Err(WorkspaceError::InvalidName(name.to_string()));
    }
    Ok(trimmed)
}
