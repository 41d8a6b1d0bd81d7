//! 记忆层：会话内的追加式对话日志

pub mod conversation;

pub use conversation::{ConversationLog, Message, Role};
