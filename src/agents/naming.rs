//! 报告文档命名
//!
//! 委派指令里通常写明「请将文档保存为 'xxx.md'」。LlmDocumentNamer 让轻量模型抽取文件名，
//! 失败或结果不可用时回退到 HeuristicNamer；两者都只保留最后一个路径分量，无扩展名时补 `.md`。

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::llm::LlmClient;
use crate::memory::Message;
use crate::workspace::validate_component;

/// 兜底文件名
pub const DEFAULT_DOCUMENT_NAME: &str = "report.md";

/// slug 的最大字符数
const SLUG_MAX_CHARS: usize = 48;

/// 文件名（不含扩展名）的最大字符数
const STEM_MAX_CHARS: usize = 100;

const NAMING_PROMPT: &str = "You extract a document file name from a task description. \
The name usually follows a phrase such as \"save as\" or \"保存为\" and is wrapped in quotes. \
If it contains a directory, return only the final file name. \
If no name is given, invent a short descriptive snake_case name ending in .md. \
Reply with the file name only, without explanation.";

#[async_trait]
pub trait DocumentNamer: Send + Sync {
    /// 从委派指令推导文档名；总能给出一个合法的单分量文件名
    async fn name_for(&self, instruction: &str) -> String;
}

fn save_as_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:保存为|存为|save\s+(?:it\s+|the\s+\w+\s+)?as|saved\s+as)\s*[:：]?\s*(?:文件名为\s*)?['‘"“「`]([^'’"”」`\n]+)['’"”」`]"#,
        )
        .unwrap()
    })
}

/// 取最后一个路径分量并去掉包裹的引号 / 反引号
fn basename(raw: &str) -> &str {
    let trimmed = raw.trim().trim_matches(|c: char| "'\"`‘’“”「」".contains(c));
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .trim()
}

/// 无扩展名时补 .md；结果不合法或过长时返回 None
fn finalize(name: &str) -> Option<String> {
    let name = basename(name);
    let (stem, with_ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => (stem, name.to_string()),
        _ => {
            let stem = name.trim_end_matches('.');
            (stem, format!("{stem}.md"))
        }
    };
    if stem.chars().count() > STEM_MAX_CHARS {
        return None;
    }
    validate_component(&with_ext).ok().map(str::to_string)
}

/// 把首个非空行转成文件名：保留字母数字（含中文），其余折叠为下划线
fn slugify(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    let mut slug = String::new();
    for c in line.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
        if slug.chars().count() >= SLUG_MAX_CHARS {
            break;
        }
    }
    slug.trim_end_matches('_').to_string()
}

/// 不调用模型的命名：先找「保存为 '…'」，否则用首行 slug
#[derive(Debug, Default, Clone)]
pub struct HeuristicNamer;

impl HeuristicNamer {
    pub fn derive(&self, instruction: &str) -> String {
        let explicit = save_as_re()
            .captures(instruction)
            .and_then(|c| finalize(&c[1]));
        explicit
            .or_else(|| finalize(&slugify(instruction)))
            .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string())
    }
}

#[async_trait]
impl DocumentNamer for HeuristicNamer {
    async fn name_for(&self, instruction: &str) -> String {
        self.derive(instruction)
    }
}

/// 用轻量模型抽取文件名
pub struct LlmDocumentNamer {
    llm: Arc<dyn LlmClient>,
    fallback: HeuristicNamer,
}

impl LlmDocumentNamer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            fallback: HeuristicNamer,
        }
    }
}

#[async_trait]
impl DocumentNamer for LlmDocumentNamer {
    async fn name_for(&self, instruction: &str) -> String {
        let messages = [Message::system(NAMING_PROMPT), Message::user(instruction)];
        match self.llm.complete(&messages).await {
            Ok(reply) => {
                let line = reply
                    .lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty() && !l.starts_with("```"))
                    .unwrap_or_default();
                match finalize(line) {
                    Some(name) => name,
                    None => {
                        tracing::warn!(reply = %reply, "naming model returned an unusable name");
                        self.fallback.derive(instruction)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "naming model failed, using heuristic name");
                self.fallback.derive(instruction)
            }
        }
    }
}
