//! YouTube 字幕读取
//!
//! 走公开的 timedtext 接口，按配置的语言顺序（默认先英文后中文）尝试，
//! 取第一份非空字幕，去掉时间轴标签后拼成纯文本。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::config::FetchSection;
use crate::tools::{truncate_chars, youtube_video_id, PageReader};

const TIMEDTEXT_URL: &str = "https://video.google.com/timedtext";

fn text_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").unwrap())
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;#39;", "'")
        .replace("&amp;quot;", "\"")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// 把 timedtext XML 转成纯文本，每条字幕一行
pub fn transcript_to_text(xml: &str) -> String {
    text_line_re()
        .captures_iter(xml)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct TranscriptReader {
    client: Client,
    languages: Vec<String>,
    max_result_chars: usize,
}

impl TranscriptReader {
    pub fn new(cfg: &FetchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            languages: cfg.transcript_languages.clone(),
            max_result_chars: cfg.max_result_chars,
        }
    }

    async fn fetch_language(&self, video_id: &str, lang: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(TIMEDTEXT_URL)
            .query(&[("lang", lang), ("v", video_id)])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let xml = resp
            .text()
            .await
            .map_err(|e| format!("Read body: {}", e))?;
        Ok(transcript_to_text(&xml))
    }
}

#[async_trait]
impl PageReader for TranscriptReader {
    async fn read(&self, url: &str) -> Result<String, String> {
        let video_id =
            youtube_video_id(url).ok_or_else(|| format!("not a YouTube url: {url}"))?;
        let mut last_error = None;
        for lang in &self.languages {
            match self.fetch_language(&video_id, lang).await {
                Ok(text) if !text.is_empty() => {
                    tracing::info!(video_id = %video_id, lang = %lang, "transcript fetched");
                    return Ok(truncate_chars(text, self.max_result_chars));
                }
                Ok(_) => tracing::debug!(video_id = %video_id, lang = %lang, "no transcript"),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| format!("no transcript available for {video_id}")))
    }
}
