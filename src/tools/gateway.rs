//! 工具网关
//!
//! 对搜索与网页读取施加统一超时，超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；
//! 每次调用输出结构化审计日志（JSON）。网关本身不重试，由调用方经 core::retry 决定。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{is_youtube_url, PageReader, SearchProvider, SearchResponse};

pub struct ToolGateway {
    search: Arc<dyn SearchProvider>,
    reader: Arc<dyn PageReader>,
    transcripts: Arc<dyn PageReader>,
    timeout: Duration,
}

impl ToolGateway {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        reader: Arc<dyn PageReader>,
        transcripts: Arc<dyn PageReader>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            search,
            reader,
            transcripts,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 关键词搜索；空查询直接返回 error 状态，不发请求；零结果同样是 error 状态
    pub async fn search(&self, query: &str) -> Result<SearchResponse, AgentError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SearchResponse::error(query, "empty query"));
        }
        let tool = format!("search:{}", self.search.name());
        let results = self.audited(&tool, query, self.search.search(query)).await?;
        if results.is_empty() {
            return Ok(SearchResponse::error(query, "未找到搜索结果"));
        }
        Ok(SearchResponse::Success {
            query: query.to_string(),
            results,
        })
    }

    /// 读取网页正文；YouTube 链接改走字幕源
    pub async fn fetch(&self, url: &str) -> Result<String, AgentError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AgentError::ToolExecutionFailed("missing url".to_string()));
        }
        if is_youtube_url(url) {
            self.audited("transcript", url, self.transcripts.read(url)).await
        } else {
            self.audited("webpage_read", url, self.reader.read(url)).await
        }
    }

    async fn audited<T, F>(&self, tool: &str, arg: &str, call: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, String>>,
    {
        let start = Instant::now();
        let result = timeout(self.timeout, call).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview(arg),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(format!("{tool}: {e}"))),
            Err(_) => Err(AgentError::ToolTimeout(tool.to_string())),
        }
    }
}

fn preview(arg: &str) -> String {
    if arg.chars().count() > 200 {
        format!("{}...", arg.chars().take(200).collect::<String>())
    } else {
        arg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SearchHit;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for CountingSearch {
        fn name(&self) -> &str {
            "counting"
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchHit>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "boom" {
                return Err("quota exceeded".to_string());
            }
            if query == "nothing" {
                return Ok(Vec::new());
            }
            Ok(vec![SearchHit {
                index: 1,
                title: query.to_string(),
                link: format!("https://example.com/{query}"),
                snippet: String::new(),
            }])
        }
    }

    struct Echo(&'static str);

    #[async_trait]
    impl PageReader for Echo {
        async fn read(&self, url: &str) -> Result<String, String> {
            Ok(format!("{}:{url}", self.0))
        }
    }

    struct Slow;

    #[async_trait]
    impl PageReader for Slow {
        async fn read(&self, _url: &str) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(String::new())
        }
    }

    fn gateway(search: Arc<CountingSearch>, reader: Arc<dyn PageReader>) -> ToolGateway {
        ToolGateway::new(search, reader, Arc::new(Echo("transcript")), 1)
    }

    #[tokio::test]
    async fn test_empty_query_makes_no_call() {
        let search = Arc::new(CountingSearch::default());
        let gw = gateway(search.clone(), Arc::new(Echo("page")));
        let resp = gw.search("   ").await.unwrap();
        assert!(!resp.is_success());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_search_success_and_failure() {
        let search = Arc::new(CountingSearch::default());
        let gw = gateway(search.clone(), Arc::new(Echo("page")));
        let resp = gw.search(" rust ").await.unwrap();
        assert_eq!(resp.query(), "rust");
        assert!(resp.is_success());

        let err = gw.search("boom").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolExecutionFailed(_)));
        assert_eq!(search.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_hits_is_error_status() {
        let search = Arc::new(CountingSearch::default());
        let gw = gateway(search.clone(), Arc::new(Echo("page")));
        let resp = gw.search("nothing").await.unwrap();
        assert_eq!(resp, SearchResponse::error("nothing", "未找到搜索结果"));
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_routes_youtube_to_transcripts() {
        let gw = gateway(Arc::new(CountingSearch::default()), Arc::new(Echo("page")));
        let page = gw.fetch("https://example.com/a").await.unwrap();
        assert_eq!(page, "page:https://example.com/a");
        let video = gw.fetch("https://youtu.be/abc123").await.unwrap();
        assert_eq!(video, "transcript:https://youtu.be/abc123");
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let gw = gateway(Arc::new(CountingSearch::default()), Arc::new(Slow));
        let err = gw.fetch("https://example.com/slow").await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(_)));
    }
}
