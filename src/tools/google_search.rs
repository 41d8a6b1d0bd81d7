//! Google Programmable Search（Custom Search JSON API）
//!
//! 凭据来自环境变量 GOOGLE_API_KEY 与 GOOGLE_SEARCH_ENGINE_ID。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::config::SearchSection;
use crate::core::AgentError;
use crate::tools::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// 单次请求最多返回条数（API 上限）
const MAX_NUM: usize = 10;

pub struct GoogleSearch {
    client: Client,
    api_key: String,
    engine_id: String,
    max_results: usize,
}

impl GoogleSearch {
    pub fn new(api_key: String, engine_id: String, cfg: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            engine_id,
            max_results: cfg.max_results.clamp(1, MAX_NUM),
        }
    }

    pub fn from_env(cfg: &SearchSection) -> Result<Self, AgentError> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| AgentError::ConfigError("GOOGLE_API_KEY is not set".to_string()))?;
        let engine_id = std::env::var("GOOGLE_SEARCH_ENGINE_ID").map_err(|_| {
            AgentError::ConfigError("GOOGLE_SEARCH_ENGINE_ID is not set".to_string())
        })?;
        Ok(Self::new(api_key, engine_id, cfg))
    }
}

/// 解析 customsearch 响应；没有 items 视为零结果
pub fn parse_google_response(body: &Value) -> Result<Vec<SearchHit>, String> {
    if let Some(err) = body.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(format!("Google API error: {msg}"));
    }
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = |k: &str| {
                item.get(k)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            SearchHit {
                index: i + 1,
                title: field("title"),
                link: field("link"),
                snippet: field("snippet"),
            }
        })
        .collect())
}

#[async_trait]
impl SearchProvider for GoogleSearch {
    fn name(&self) -> &str {
        "google"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        let num = self.max_results.to_string();
        let resp = self
            .client
            .get(ENDPOINT)
            .query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response ({status}): {e}"))?;
        let hits = parse_google_response(&body)?;
        tracing::debug!(query = %query, hits = hits.len(), "google search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_items() {
        let body = json!({
            "items": [
                {"title": "Rust", "link": "https://www.rust-lang.org", "snippet": "Fast"},
                {"title": "Docs", "link": "https://doc.rust-lang.org"}
            ]
        });
        let hits = parse_google_response(&body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].index, 1);
        assert_eq!(hits[1].index, 2);
        assert_eq!(hits[1].snippet, "");
    }

    #[test]
    fn test_parse_no_items_and_error() {
        assert!(parse_google_response(&json!({"searchInformation": {}}))
            .unwrap()
            .is_empty());
        let err = parse_google_response(&json!({"error": {"code": 403, "message": "quota"}}))
            .unwrap_err();
        assert!(err.contains("quota"));
    }

    #[test]
    fn test_max_results_clamped() {
        let cfg = SearchSection {
            max_results: 50,
            ..SearchSection::default()
        };
        let g = GoogleSearch::new("k".into(), "cx".into(), &cfg);
        assert_eq!(g.max_results, 10);
    }
}
