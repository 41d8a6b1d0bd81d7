//! 网页读取：经阅读代理（默认 r.jina.ai）抓取正文
//!
//! 代理返回的通常已是纯文本 / Markdown；若仍是 HTML，用 html2text 提取可读文本。
//! 正文超过 max_result_chars 时截断并追加 ...[truncated]。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;

use crate::config::FetchSection;
use crate::tools::{truncate_chars, PageReader};

/// 代理没有返回任何正文时的占位文本
pub const EMPTY_CONTENT: &str = "无法获取内容";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

fn youtube_watch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([^&\n?]*)").unwrap())
}

fn youtube_embed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"youtube\.com/embed/([^&\n?]*)").unwrap())
}

/// 从 YouTube 链接中提取视频 ID
pub fn youtube_video_id(url: &str) -> Option<String> {
    [youtube_watch_re(), youtube_embed_re()]
        .iter()
        .find_map(|re| re.captures(url))
        .map(|c| c[1].to_string())
        .filter(|id| !id.is_empty())
}

pub fn is_youtube_url(url: &str) -> bool {
    youtube_video_id(url).is_some()
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head")))
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

/// 经阅读代理读取网页
pub struct WebReader {
    client: Client,
    reader_base_url: String,
    max_result_chars: usize,
}

impl WebReader {
    pub fn new(cfg: &FetchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            reader_base_url: cfg.reader_base_url.clone(),
            max_result_chars: cfg.max_result_chars,
        }
    }

    /// 代理地址 + 原始 URL；未配置代理时直连
    fn proxied(&self, url: &str) -> String {
        format!("{}{}", self.reader_base_url, url)
    }

    /// 把响应体整理成回灌给模型的正文
    fn normalize_body(&self, body: String) -> String {
        let body = body.trim_start_matches('\u{FEFF}');
        let text = if looks_like_html(body) {
            html_to_text(body)
        } else {
            body.to_string()
        };
        if text.trim().is_empty() {
            return EMPTY_CONTENT.to_string();
        }
        truncate_chars(text, self.max_result_chars)
    }
}

#[async_trait]
impl PageReader for WebReader {
    async fn read(&self, url: &str) -> Result<String, String> {
        let target = self.proxied(url);
        tracing::info!(url = %url, "webpage read");
        let resp = self
            .client
            .get(&target)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        Ok(self.normalize_body(body))
    }
}
