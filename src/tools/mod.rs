//! 工具层：关键词搜索与网页读取
//!
//! 搜索后端（SearchProvider）与网页读取（PageReader）是注入的协作者；
//! ToolGateway 在其上统一施加超时与审计日志，自身不重试。

pub mod gateway;
pub mod google_search;
pub mod transcript;
pub mod web_reader;
pub mod zhipu_search;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gateway::ToolGateway;
pub use google_search::GoogleSearch;
pub use transcript::TranscriptReader;
pub use web_reader::{is_youtube_url, youtube_video_id, WebReader};
pub use zhipu_search::ZhipuSearch;

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub index: usize,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

/// 搜索响应：成功时带结果列表，失败时带说明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SearchResponse {
    Success {
        query: String,
        results: Vec<SearchHit>,
    },
    Error {
        query: String,
        message: String,
    },
}

impl SearchResponse {
    pub fn error(query: impl Into<String>, message: impl Into<String>) -> Self {
        SearchResponse::Error {
            query: query.into(),
            message: message.into(),
        }
    }

    pub fn query(&self) -> &str {
        match self {
            SearchResponse::Success { query, .. } | SearchResponse::Error { query, .. } => query,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SearchResponse::Success { .. })
    }

    /// 回灌给模型的文本形态（JSON）
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"status\":\"error\",\"message\":\"{e}\"}}"))
    }
}

/// 关键词搜索后端
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String>;
}

/// 网页（或视频字幕）读取
#[async_trait]
pub trait PageReader: Send + Sync {
    async fn read(&self, url: &str) -> Result<String, String>;
}

/// 按字符数截断，超出时追加标记
pub(crate) fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}
