//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再叠加显式指定的配置文件，最后用环境变量 `SEEKER__*` 覆盖
//! （双下划线表示嵌套，如 `SEEKER__LLM__PROVIDER=deepseek`）。
//! 凭据（API Key、搜索引擎 ID）只从各自的环境变量读取，不进配置文件。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：任务目录根、主控与子 Agent 的轮数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub tasks_root: PathBuf,
    /// 主控单次输入内最多调用模型的轮数
    pub max_turns: usize,
    /// 每次委派的子 Agent 最多轮数
    pub sub_agent_max_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            tasks_root: PathBuf::from("tasks"),
            max_turns: 30,
            sub_agent_max_turns: 20,
        }
    }
}

/// [llm] 段：后端选择、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：gemini / deepseek / openai
    pub provider: String,
    /// 未设置时使用后端预设模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 文档命名用的轻量模型
    pub naming_model: Option<String>,
    pub timeouts: LlmTimeoutsSection,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            base_url: None,
            naming_model: None,
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

impl LlmRetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: std::time::Duration::from_millis(self.initial_backoff_ms),
            max_backoff: std::time::Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// [tools] 段：工具超时、搜索后端、网页抓取
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒），由网关施加
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub fetch: FetchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 60,
            search: SearchSection::default(),
            fetch: FetchSection::default(),
        }
    }
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// google / zhipu
    pub provider: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            max_results: 10,
            timeout_secs: 15,
        }
    }
}

/// [tools.fetch] 段：阅读代理、超时、正文截断、字幕语言优先级
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchSection {
    pub reader_base_url: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub transcript_languages: Vec<String>,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            reader_base_url: "https://r.jina.ai/".to_string(),
            timeout_secs: 30,
            max_result_chars: 20000,
            transcript_languages: vec!["en".to_string(), "zh".to_string()],
        }
    }
}

/// 从 config 目录加载配置，环境变量 SEEKER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SEEKER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SEEKER")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
