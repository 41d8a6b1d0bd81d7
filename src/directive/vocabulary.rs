//! 各会话的封闭指令集与主指令互斥检查
//!
//! 每种会话（主控 / 搜索 / 写作）有一组已知指令，其余名字归为 Unrecognized。
//! 主指令决定本轮控制流；一轮回复里出现多个可执行的主指令属于协议违规：
//! 记录告警后按固定优先级取胜者，不中断会话。内容拆分后为空的工具指令
//! （如 `<quick_search> , </quick_search>`）不算可执行，直接让位给后面的指令。

use crate::directive::{split_queries, split_urls, DirectiveMap};

/// 一种会话的指令集
pub trait DirectiveSet: Sized + Clone + PartialEq + std::fmt::Debug {
    /// 会话名（日志与事件用）
    const AGENT: &'static str;

    fn from_name(name: &str) -> Self;

    fn name(&self) -> &str;

    /// 主指令的优先级，数值越小越优先；非主指令返回 None
    fn primary_rank(&self) -> Option<u8>;

    fn is_unrecognized(&self) -> bool;

    /// 按本轮内容判断该指令能否真正执行；默认可执行
    fn is_actionable(&self, _map: &DirectiveMap) -> bool {
        true
    }
}

/// 主控会话指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerDirective {
    Planning,
    TodoList,
    SearchAgent,
    WritingAgent,
    QuickSearch,
    MessageAskUser,
    MessageNotifyUser,
    TaskOutput,
    Unrecognized(String),
}

impl DirectiveSet for ControllerDirective {
    const AGENT: &'static str = "controller";

    fn from_name(name: &str) -> Self {
        match name {
            "planning" => Self::Planning,
            "todo_list" => Self::TodoList,
            "search_agent" => Self::SearchAgent,
            "writing_agent" => Self::WritingAgent,
            "quick_search" => Self::QuickSearch,
            "message_ask_user" => Self::MessageAskUser,
            "message_notify_user" => Self::MessageNotifyUser,
            "task_output" => Self::TaskOutput,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Planning => "planning",
            Self::TodoList => "todo_list",
            Self::SearchAgent => "search_agent",
            Self::WritingAgent => "writing_agent",
            Self::QuickSearch => "quick_search",
            Self::MessageAskUser => "message_ask_user",
            Self::MessageNotifyUser => "message_notify_user",
            Self::TaskOutput => "task_output",
            Self::Unrecognized(name) => name,
        }
    }

    fn primary_rank(&self) -> Option<u8> {
        match self {
            Self::WritingAgent => Some(0),
            Self::SearchAgent => Some(1),
            Self::QuickSearch => Some(2),
            Self::MessageAskUser => Some(3),
            _ => None,
        }
    }

    fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }

    /// 委派指令即使为空也要执行（以 Dispatch 错误结束）；quick_search 要有非空查询
    fn is_actionable(&self, map: &DirectiveMap) -> bool {
        match self {
            Self::QuickSearch => !split_queries(map.contents("quick_search")).is_empty(),
            _ => true,
        }
    }
}

/// 搜索子 Agent 指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDirective {
    Planning,
    QuickSearch,
    WebpageRead,
    Report,
    Unrecognized(String),
}

impl DirectiveSet for SearchDirective {
    const AGENT: &'static str = "search_agent";

    fn from_name(name: &str) -> Self {
        match name {
            "planning" => Self::Planning,
            "quick_search" => Self::QuickSearch,
            "webpage_read" => Self::WebpageRead,
            "report" => Self::Report,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Planning => "planning",
            Self::QuickSearch => "quick_search",
            Self::WebpageRead => "webpage_read",
            Self::Report => "report",
            Self::Unrecognized(name) => name,
        }
    }

    fn primary_rank(&self) -> Option<u8> {
        match self {
            Self::QuickSearch => Some(0),
            Self::WebpageRead => Some(1),
            Self::Report => Some(2),
            _ => None,
        }
    }

    fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }

    fn is_actionable(&self, map: &DirectiveMap) -> bool {
        match self {
            Self::QuickSearch => !split_queries(map.contents("quick_search")).is_empty(),
            Self::WebpageRead => !split_urls(map.contents("webpage_read")).is_empty(),
            Self::Report => map.contains("report"),
            _ => true,
        }
    }
}

/// 写作子 Agent 指令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritingDirective {
    Planning,
    FileRead,
    Report,
    Unrecognized(String),
}

impl DirectiveSet for WritingDirective {
    const AGENT: &'static str = "writing_agent";

    fn from_name(name: &str) -> Self {
        match name {
            "planning" => Self::Planning,
            "file_read" => Self::FileRead,
            "report" => Self::Report,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Planning => "planning",
            Self::FileRead => "file_read",
            Self::Report => "report",
            Self::Unrecognized(name) => name,
        }
    }

    fn primary_rank(&self) -> Option<u8> {
        match self {
            Self::FileRead => Some(0),
            Self::Report => Some(1),
            _ => None,
        }
    }

    fn is_unrecognized(&self) -> bool {
        matches!(self, Self::Unrecognized(_))
    }

    fn is_actionable(&self, map: &DirectiveMap) -> bool {
        match self {
            Self::FileRead => !split_queries(map.contents("file_read")).is_empty(),
            Self::Report => map.contains("report"),
            _ => true,
        }
    }
}

/// 对一轮回复做结构检查的结果
#[derive(Debug, Clone)]
pub struct Classified<D> {
    /// 本轮出现的所有指令（含仅空白的），按名字序
    pub present: Vec<D>,
    /// 决定控制流的主指令（多个时取优先级最高者）；None 表示没有可执行的主指令
    pub primary: Option<D>,
    /// 出现了多个可执行主指令时，全部这些指令（按优先级排序）；否则为空
    pub conflicting: Vec<D>,
}

impl<D: DirectiveSet> Classified<D> {
    pub fn has_violation(&self) -> bool {
        !self.conflicting.is_empty()
    }

    pub fn unrecognized(&self) -> impl Iterator<Item = &str> {
        self.present
            .iter()
            .filter(|d| d.is_unrecognized())
            .map(|d| d.name())
    }

    pub fn contains(&self, directive: &D) -> bool {
        self.present.contains(directive)
    }
}

/// 按会话指令集归类一轮解析结果，并做主指令互斥检查
pub fn classify<D: DirectiveSet>(map: &DirectiveMap) -> Classified<D> {
    let present: Vec<D> = map.surfaced_names().map(D::from_name).collect();

    let mut primaries: Vec<D> = present
        .iter()
        .filter(|d| d.primary_rank().is_some() && d.is_actionable(map))
        .cloned()
        .collect();
    primaries.sort_by_key(|d| d.primary_rank());

    let primary = primaries.first().cloned();
    let conflicting = if primaries.len() > 1 {
        primaries
    } else {
        Vec::new()
    };
    Classified {
        present,
        primary,
        conflicting,
    }
}
