//! 会话过程事件：供 CLI 等前端展示进度（notify 消息、工具调用、委派、文档保存）

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

pub type EventSender = UnboundedSender<AgentEvent>;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 开始第几轮模型调用
    TurnStarted {
        agent: String,
        turn: usize,
        max_turns: usize,
    },
    /// 模型回复（预览）
    ModelReply { agent: String, preview: String },
    /// 本轮解析出的指令名
    DirectivesParsed { agent: String, names: Vec<String> },
    QuickSearch { agent: String, query: String, ok: bool },
    PageRead { agent: String, url: String, chars: usize },
    FileRead { agent: String, name: String, found: bool },
    /// 主控委派子 Agent
    Delegation { target: String, instruction: String },
    DocumentSaved { name: String },
    /// 一轮回复里出现多个可执行的主指令；chosen 即实际执行的指令
    ExclusivityViolation {
        agent: String,
        directives: Vec<String>,
        chosen: String,
    },
    /// 模型发给用户的进度通知
    Notify { text: String },
    Error { text: String },
}

pub(crate) fn send_event(tx: &Option<EventSender>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 按字符截断，用于事件与日志里的预览
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let ev = AgentEvent::Notify {
            text: "正在收集资料".into(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "notify");
        assert_eq!(v["text"], "正在收集资料");
    }

    #[test]
    fn test_send_without_channel_is_noop() {
        send_event(&None, AgentEvent::Error { text: "x".into() });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        send_event(&Some(tx), AgentEvent::DocumentSaved { name: "a.md".into() });
        assert_eq!(
            rx.try_recv().unwrap(),
            AgentEvent::DocumentSaved { name: "a.md".into() }
        );
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("ab", 3), "ab");
    }
}
