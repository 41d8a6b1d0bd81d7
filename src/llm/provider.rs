//! 模型后端选择
//!
//! 内置三个 OpenAI 兼容后端的预设（Gemini / DeepSeek / OpenAI）；按 [llm].provider 与对应 API Key
//! 构建客户端，并统一包上 RetryingLlmClient（单次超时 + 退避重试）。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{LlmClient, OpenAiClient, RetryingLlmClient};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const GEMINI_FLASH: &str = "gemini-2.0-flash";
pub const GEMINI_FLASH_LITE: &str = "gemini-2.0-flash-lite";

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// 后端预设：默认 base_url、默认模型、读取 Key 的环境变量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gemini,
    DeepSeek,
    OpenAi,
}

impl Provider {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "gemini" | "google" => Some(Provider::Gemini),
            "deepseek" => Some(Provider::DeepSeek),
            "openai" => Some(Provider::OpenAi),
            _ => None,
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some(GEMINI_BASE_URL),
            Provider::DeepSeek => Some(DEEPSEEK_BASE_URL),
            Provider::OpenAi => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => GEMINI_FLASH,
            Provider::DeepSeek => DEEPSEEK_CHAT,
            Provider::OpenAi => OPENAI_DEFAULT_MODEL,
        }
    }

    /// 文档命名用的轻量模型；没有更便宜选项的后端沿用对话模型
    pub fn default_naming_model(&self) -> Option<&'static str> {
        match self {
            Provider::Gemini => Some(GEMINI_FLASH_LITE),
            Provider::DeepSeek | Provider::OpenAi => None,
        }
    }
}

fn parse_provider(cfg: &AppConfig) -> Result<Provider, AgentError> {
    Provider::parse(&cfg.llm.provider).ok_or_else(|| {
        AgentError::ConfigError(format!("unknown llm provider: {}", cfg.llm.provider))
    })
}

fn build_client(cfg: &AppConfig, model: Option<&str>) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = parse_provider(cfg)?;
    let api_key = std::env::var(provider.api_key_env()).map_err(|_| {
        AgentError::ConfigError(format!("{} is not set", provider.api_key_env()))
    })?;
    let base_url = cfg
        .llm
        .base_url
        .as_deref()
        .or_else(|| provider.default_base_url());
    let model = model
        .map(str::to_string)
        .or_else(|| cfg.llm.model.clone())
        .unwrap_or_else(|| provider.default_model().to_string());

    tracing::info!(provider = ?provider, model = %model, "llm client configured");
    let raw: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(base_url, &model, &api_key));
    Ok(Arc::new(RetryingLlmClient::new(
        raw,
        cfg.llm.retry.to_retry_config(),
        Duration::from_secs(cfg.llm.timeouts.request),
    )))
}

/// 主控与子 Agent 共用的对话模型
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    build_client(cfg, None)
}

/// 文档命名用的轻量模型：naming_model > 后端预设的轻量模型 > 对话模型
pub fn create_naming_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = parse_provider(cfg)?;
    let model = cfg
        .llm
        .naming_model
        .as_deref()
        .or_else(|| provider.default_naming_model());
    build_client(cfg, model)
}
