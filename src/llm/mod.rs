//! LLM 层：客户端抽象、OpenAI 兼容实现、后端预设、脚本化 Mock

pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use mock::ScriptedLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use provider::{create_llm_from_config, create_naming_llm_from_config, Provider};
pub use traits::{LlmClient, LlmError, RetryingLlmClient};
