//! 会话层：主控会话与两种子 Agent
//!
//! - **controller**: 面向用户的主控会话，负责规划与委派
//! - **search_agent** / **writing_agent**: 一次性子 Agent，以 report 指令结束
//! - **session**: 共享的轮次循环与依赖
//! - **naming** / **prompts** / **events** / **outcome**: 文档命名、系统提示词、进度事件、子 Agent 结果

pub mod controller;
pub mod events;
pub mod naming;
pub mod outcome;
pub mod prompts;
pub mod search_agent;
pub mod session;
pub mod writing_agent;

pub use controller::{default_task_id, ControllerSession};
pub use events::{AgentEvent, EventSender};
pub use naming::{DocumentNamer, HeuristicNamer, LlmDocumentNamer, DEFAULT_DOCUMENT_NAME};
pub use outcome::{AgentOrigin, SubAgentOutcome};
pub use prompts::{DocumentPreview, Prompts};
pub use search_agent::SearchAgent;
pub use session::{drive, AgentContext, Session, Step, TurnLoop};
pub use writing_agent::WritingAgent;
