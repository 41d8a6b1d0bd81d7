//! 智谱 web-search-pro 搜索
//!
//! 凭据来自环境变量 ZHIPU_API_KEY；结果在 choices[].message.tool_calls[] 中类型为 search_result 的条目里。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::SearchSection;
use crate::core::AgentError;
use crate::tools::{SearchHit, SearchProvider};

const ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/tools";

pub struct ZhipuSearch {
    client: Client,
    api_key: String,
    max_results: usize,
}

impl ZhipuSearch {
    pub fn new(api_key: String, cfg: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            max_results: cfg.max_results.max(1),
        }
    }

    pub fn from_env(cfg: &SearchSection) -> Result<Self, AgentError> {
        let api_key = std::env::var("ZHIPU_API_KEY")
            .map_err(|_| AgentError::ConfigError("ZHIPU_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key, cfg))
    }
}

pub fn parse_zhipu_response(body: &Value, max_results: usize) -> Result<Vec<SearchHit>, String> {
    if let Some(err) = body.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(format!("Zhipu API error: {msg}"));
    }
    let results = body
        .get("choices")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|c| c.pointer("/message/tool_calls").and_then(Value::as_array))
        .flatten()
        .filter(|call| call.get("type").and_then(Value::as_str) == Some("search_result"))
        .filter_map(|call| call.get("search_result").and_then(Value::as_array))
        .flatten();

    Ok(results
        .take(max_results)
        .enumerate()
        .map(|(i, r)| {
            let field = |k: &str| r.get(k).and_then(Value::as_str).unwrap_or_default().to_string();
            SearchHit {
                index: i + 1,
                title: field("title"),
                link: field("link"),
                snippet: field("content"),
            }
        })
        .collect())
}

#[async_trait]
impl SearchProvider for ZhipuSearch {
    fn name(&self) -> &str {
        "zhipu"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
        let payload = json!({
            "tool": "web-search-pro",
            "messages": [{"role": "user", "content": query}],
            "stream": false,
        });
        let resp = self
            .client
            .post(ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response ({status}): {e}"))?;
        let hits = parse_zhipu_response(&body, self.max_results)?;
        tracing::debug!(query = %query, hits = hits.len(), "zhipu search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_results() {
        let body = json!({
            "choices": [{
                "message": {
                    "tool_calls": [
                        {"type": "search_intent", "search_intent": [{"query": "rust"}]},
                        {"type": "search_result", "search_result": [
                            {"title": "A", "link": "https://a", "content": "aa"},
                            {"title": "B", "link": "https://b", "content": "bb"},
                            {"title": "C", "link": "https://c", "content": "cc"}
                        ]}
                    ]
                }
            }]
        });
        let hits = parse_zhipu_response(&body, 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].snippet, "aa");
        assert_eq!(hits[1].link, "https://b");
    }

    #[test]
    fn test_parse_error() {
        let err = parse_zhipu_response(&json!({"error": {"message": "bad key"}}), 5).unwrap_err();
        assert!(err.contains("bad key"));
        assert!(parse_zhipu_response(&json!({}), 5).unwrap().is_empty());
    }
}
