//! 系统提示词
//!
//! 内置英文默认值；可用 `config/prompts/{controller,search_agent,writing_agent}.txt` 覆盖。
//! 写作 Agent 的提示词在每次委派时附上任务文档上下文。

use std::path::{Path, PathBuf};

pub const CONTROLLER_PROMPT: &str = r#"You are the controller of a deep research system. You work with the user to plan and complete a research task, and you coordinate helpers behind the scenes. Never mention the helpers to the user.

Reply with a single ```xml fenced block containing one or more of these tags:

<planning>your reasoning about the next step (internal)</planning>
<todo_list>the user-facing Markdown task list; mark finished items with [x]</todo_list>
<quick_search>keyword 1, keyword 2</quick_search>
    quick web lookups to improve your own understanding before asking the user
<search_agent>one focused information-gathering task; end with: Save the document as 'name.md'.</search_agent>
<writing_agent>one focused writing task based on existing documents (name them); end with: Save the report as 'name.md'.</writing_agent>
<message_notify_user>short progress update; send one whenever you delegate</message_notify_user>
<message_ask_user>a question or confirmation request for the user</message_ask_user>
<task_output>internal record of produced artifacts</task_output>

Rules:
- Use at most one of search_agent, writing_agent, quick_search, message_ask_user per reply.
- Confirm the research plan with the user via message_ask_user before delegating.
- After the final report is written, ask the user for feedback via message_ask_user.
- Put literal tag names inside backticks when you mention them in text."#;

pub const SEARCH_AGENT_PROMPT: &str = r#"You are a search agent. You gather information for one focused task and write a Markdown document with your findings.

Reply with a single ```xml fenced block containing one or more of these tags:

<planning>what you will look for next (internal)</planning>
<quick_search>keyword 1, keyword 2</quick_search>
<webpage_read>one or more URLs separated by commas or new lines</webpage_read>
    YouTube links return the video transcript
<report>the complete Markdown document</report>

Rules:
- Use one of quick_search, webpage_read or report per reply.
- Read the most relevant pages before reporting; cite sources with links.
- The report is saved as-is, so write it in full."#;

pub const WRITING_AGENT_PROMPT: &str = r#"You are a writing agent. You write a Markdown report based on the documents of the current research task.

Reply with a single ```xml fenced block containing one or more of these tags:

<planning>how you will structure the report (internal)</planning>
<file_read>document names separated by commas</file_read>
<report>the complete Markdown report</report>

Rules:
- Use one of file_read or report per reply.
- Read every document you rely on before writing.
- The report is saved as-is, so write it in full."#;

/// 文档预览的字符数
pub const PREVIEW_CHARS: usize = 200;

/// 三类会话的系统提示词
#[derive(Debug, Clone)]
pub struct Prompts {
    pub controller: String,
    pub search_agent: String,
    pub writing_agent: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            controller: CONTROLLER_PROMPT.to_string(),
            search_agent: SEARCH_AGENT_PROMPT.to_string(),
            writing_agent: WRITING_AGENT_PROMPT.to_string(),
        }
    }
}

impl Prompts {
    /// 依次在 config/prompts、../config/prompts（或给定目录）下查找覆盖文件，找不到用内置值
    pub fn load(dir: Option<&Path>) -> Self {
        let dirs: Vec<PathBuf> = match dir {
            Some(d) => vec![d.to_path_buf()],
            None => vec![
                PathBuf::from("config/prompts"),
                PathBuf::from("../config/prompts"),
            ],
        };
        let read = |file: &str, builtin: &str| {
            dirs.iter()
                .map(|d| d.join(file))
                .find_map(|p| std::fs::read_to_string(p).ok())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| builtin.to_string())
        };
        Self {
            controller: read("controller.txt", CONTROLLER_PROMPT),
            search_agent: read("search_agent.txt", SEARCH_AGENT_PROMPT),
            writing_agent: read("writing_agent.txt", WRITING_AGENT_PROMPT),
        }
    }
}

/// 单个文档的预览
#[derive(Debug, Clone)]
pub struct DocumentPreview {
    pub name: String,
    pub preview: String,
}

impl DocumentPreview {
    pub fn new(name: impl Into<String>, content: &str) -> Self {
        let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
        let preview = if flat.chars().count() > PREVIEW_CHARS {
            format!("{}...", flat.chars().take(PREVIEW_CHARS).collect::<String>())
        } else {
            flat
        };
        Self {
            name: name.into(),
            preview,
        }
    }
}

/// 写作 Agent 的完整系统提示词：基础提示 + 文档列表 + 待办清单 + 预览
pub fn writing_agent_system_prompt(
    base: &str,
    documents: &[DocumentPreview],
    todo_list: Option<&str>,
) -> String {
    let mut prompt = String::from(base);
    prompt.push_str("\n\n## Available documents\n");
    if documents.is_empty() {
        prompt.push_str("(none yet)\n");
    }
    for doc in documents {
        prompt.push_str(&format!("- {}\n", doc.name));
    }
    if let Some(todo) = todo_list.map(str::trim).filter(|t| !t.is_empty()) {
        prompt.push_str("\n## Current todo list\n");
        prompt.push_str(todo);
        prompt.push('\n');
    }
    if !documents.is_empty() {
        prompt.push_str("\n## Document previews\n");
        for doc in documents {
            prompt.push_str(&format!("### {}\n{}\n", doc.name, doc.preview));
        }
    }
    prompt
}
