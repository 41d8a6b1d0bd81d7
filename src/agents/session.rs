//! 会话骨架：显式轮次循环 + 共享依赖
//!
//! 每个会话持有自己的对话日志与一个绑定 task_id 的 tracing span。
//! 轮次循环：调用 turn() 直到返回 Step::Terminal，超过 max_turns 抛 LoopGuardTripped。
//! 所有挂起点（模型调用、工具调用、命名）都与取消令牌 select，取消时不追加半截消息。

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};
use uuid::Uuid;

use crate::agents::events::{preview, send_event, AgentEvent, EventSender};
use crate::agents::naming::DocumentNamer;
use crate::agents::prompts::Prompts;
use crate::core::{retry_with_backoff, AgentError, RetryConfig};
use crate::directive::{classify, parse, Classified, DirectiveMap, DirectiveSet};
use crate::llm::LlmClient;
use crate::memory::{ConversationLog, Message};
use crate::observability::task_span;
use crate::tools::{SearchResponse, ToolGateway};
use crate::workspace::TaskWorkspace;

/// 事件与日志里模型回复的预览长度
const REPLY_PREVIEW_CHARS: usize = 300;

/// 一轮处理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Continue,
    Terminal(T),
}

/// 会话共享的依赖（主控与每次委派的子 Agent 共用）
#[derive(Clone)]
pub struct AgentContext {
    pub llm: Arc<dyn LlmClient>,
    pub gateway: Arc<ToolGateway>,
    pub workspace: Arc<dyn TaskWorkspace>,
    pub namer: Arc<dyn DocumentNamer>,
    pub prompts: Arc<Prompts>,
    /// 工具调用的重试策略
    pub tool_retry: RetryConfig,
    pub max_turns: usize,
    pub sub_agent_max_turns: usize,
    pub cancel: CancellationToken,
    pub events: Option<EventSender>,
}

impl AgentContext {
    pub fn emit(&self, ev: AgentEvent) {
        send_event(&self.events, ev);
    }

    /// 与取消令牌竞争；取消优先
    pub async fn cancellable<T, F>(&self, fut: F) -> Result<T, AgentError>
    where
        F: Future<Output = Result<T, AgentError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            result = fut => result,
        }
    }

    /// 调用模型（重试与单次超时在 RetryingLlmClient 内）
    pub async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        self.cancellable(async { self.llm.complete(messages).await.map_err(AgentError::from) })
            .await
    }

    /// 搜索（含重试）；重试用尽后的失败转为 error 状态的响应回灌给模型，只有取消向上传播
    pub async fn search(&self, query: &str) -> Result<SearchResponse, AgentError> {
        let gateway: &ToolGateway = &self.gateway;
        let result = self
            .cancellable(retry_with_backoff(&self.tool_retry, "tools.search", move || {
                gateway.search(query)
            }))
            .await;
        match result {
            Err(AgentError::Cancelled) => Err(AgentError::Cancelled),
            Err(e) => {
                tracing::warn!(query = %query, error = %e, "search failed");
                Ok(SearchResponse::error(query.trim(), e.to_string()))
            }
            ok => ok,
        }
    }

    pub async fn fetch(&self, url: &str) -> Result<String, AgentError> {
        let gateway: &ToolGateway = &self.gateway;
        self.cancellable(retry_with_backoff(&self.tool_retry, "tools.fetch", move || {
            gateway.fetch(url)
        }))
        .await
    }

    /// quick_search 扇出：并发搜索，按提交顺序每个查询追加一条 user 消息
    ///
    /// 失败的查询以 error 状态追加；被取消时整轮不追加任何消息。
    pub async fn quick_search_round(
        &self,
        session: &mut Session,
        queries: &[String],
    ) -> Result<(), AgentError> {
        tracing::info!(count = queries.len(), "quick search");
        let responses = join_all(queries.iter().map(|q| self.search(q))).await;
        let responses = responses.into_iter().collect::<Result<Vec<_>, _>>()?;
        for (query, response) in queries.iter().zip(responses) {
            self.emit(AgentEvent::QuickSearch {
                agent: session.agent.to_string(),
                query: query.clone(),
                ok: response.is_success(),
            });
            session.append(Message::user(format!(
                "Quick Search Results for '{}':\n{}",
                query,
                response.to_json()
            )));
        }
        Ok(())
    }

    /// 解析一轮回复并按会话指令集做互斥检查；违规时告警并发事件
    pub fn inspect<D: DirectiveSet>(&self, reply: &str) -> (DirectiveMap, Classified<D>) {
        tracing::debug!(reply = %reply, "model reply");
        self.emit(AgentEvent::ModelReply {
            agent: D::AGENT.to_string(),
            preview: preview(reply, REPLY_PREVIEW_CHARS),
        });

        let map = parse(reply);
        let classified = classify::<D>(&map);
        let names: Vec<String> = classified.present.iter().map(|d| d.name().to_string()).collect();
        tracing::info!(directives = ?names, "directives parsed");
        self.emit(AgentEvent::DirectivesParsed {
            agent: D::AGENT.to_string(),
            names,
        });

        if classified.has_violation() {
            let directives: Vec<String> = classified
                .conflicting
                .iter()
                .map(|d| d.name().to_string())
                .collect();
            let chosen = classified
                .primary
                .as_ref()
                .map(|d| d.name().to_string())
                .unwrap_or_default();
            tracing::warn!(directives = ?directives, chosen = %chosen, "more than one primary directive in reply");
            self.emit(AgentEvent::ExclusivityViolation {
                agent: D::AGENT.to_string(),
                directives,
                chosen,
            });
        }
        for name in classified.unrecognized() {
            tracing::debug!(name = %name, "unrecognized directive ignored");
        }
        (map, classified)
    }
}

/// 会话状态：ID、对话日志、任务 ID、span
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub task_id: String,
    pub agent: &'static str,
    log: ConversationLog,
    span: Span,
}

impl Session {
    pub fn new(task_id: impl Into<String>, agent: &'static str) -> Self {
        Self::with_log(task_id, agent, ConversationLog::new())
    }

    /// 以已有日志恢复会话
    pub fn with_log(task_id: impl Into<String>, agent: &'static str, log: ConversationLog) -> Self {
        let task_id = task_id.into();
        let span = task_span(&task_id, agent);
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent,
            log,
            span,
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn append(&mut self, msg: Message) {
        self.log.append(msg);
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// 一种会话的单轮处理
#[async_trait]
pub trait TurnLoop: Send {
    type Output: Send;

    fn session(&self) -> &Session;

    fn max_turns(&self) -> usize;

    fn events(&self) -> Option<&EventSender>;

    async fn turn(&mut self) -> Result<Step<Self::Output>, AgentError>;
}

/// 驱动轮次循环，直到终止指令或轮数上限
pub async fn drive<L: TurnLoop>(looper: &mut L) -> Result<L::Output, AgentError> {
    let span = looper.session().span().clone();
    async move {
        let agent = looper.session().agent;
        let max_turns = looper.max_turns();
        for turn in 1..=max_turns {
            if let Some(tx) = looper.events() {
                let _ = tx.send(AgentEvent::TurnStarted {
                    agent: agent.to_string(),
                    turn,
                    max_turns,
                });
            }
            tracing::debug!(turn, max_turns, "turn started");
            if let Step::Terminal(out) = looper.turn().await? {
                return Ok(out);
            }
        }
        tracing::warn!(max_turns, "turn limit reached without a terminal directive");
        Err(AgentError::LoopGuardTripped {
            agent: agent.to_string(),
            max_turns,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Countdown {
        session: Session,
        remaining: usize,
        turns: usize,
    }

    #[async_trait]
    impl TurnLoop for Countdown {
        type Output = usize;

        fn session(&self) -> &Session {
            &self.session
        }

        fn max_turns(&self) -> usize {
            3
        }

        fn events(&self) -> Option<&EventSender> {
            None
        }

        async fn turn(&mut self) -> Result<Step<usize>, AgentError> {
            self.turns += 1;
            if self.remaining == 0 {
                return Ok(Step::Terminal(self.turns));
            }
            self.remaining -= 1;
            Ok(Step::Continue)
        }
    }

    fn countdown(remaining: usize) -> Countdown {
        Countdown {
            session: Session::new("t", "test"),
            remaining,
            turns: 0,
        }
    }

    #[tokio::test]
    async fn test_terminal_within_limit() {
        let mut l = countdown(2);
        assert_eq!(drive(&mut l).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_loop_guard_at_limit() {
        let mut l = countdown(10);
        let err = drive(&mut l).await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::LoopGuardTripped { ref agent, max_turns: 3 } if agent == "test"
        ));
        assert_eq!(l.turns, 3);
    }

    #[test]
    fn test_session_log_is_append_only() {
        let mut s = Session::new("t", "controller");
        s.append(Message::user("a"));
        s.append(Message::assistant("b"));
        assert_eq!(s.log().len(), 2);
        assert_eq!(s.task_id, "t");
    }
}
