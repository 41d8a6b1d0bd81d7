//! 搜索子 Agent
//!
//! 每次委派新建一个会话（system + 委派指令作为前两条消息），不继承主控日志。
//! 指令：quick_search（并发搜索）> webpage_read（读取网页 / 视频字幕）> report（终止，写文档）。

use async_trait::async_trait;

use crate::agents::events::{AgentEvent, EventSender};
use crate::agents::outcome::{finish_report, AgentOrigin, SubAgentOutcome};
use crate::agents::session::{drive, AgentContext, Session, Step, TurnLoop};
use crate::core::AgentError;
use crate::directive::{split_queries, split_urls, SearchDirective};
use crate::memory::Message;
use crate::tools::web_reader::EMPTY_CONTENT;
use crate::workspace::SEARCH_AGENT_LOG;

pub struct SearchAgent {
    ctx: AgentContext,
    session: Session,
    instruction: String,
}

impl SearchAgent {
    pub fn new(ctx: AgentContext, task_id: &str, instruction: &str) -> Self {
        let mut session = Session::new(task_id, "search_agent");
        session.append(Message::system(ctx.prompts.search_agent.clone()));
        session.append(Message::user(instruction));
        Self {
            ctx,
            session,
            instruction: instruction.to_string(),
        }
    }

    /// 运行到 report 或轮数上限；会话随 self 在所有路径上释放
    pub async fn run(mut self) -> Result<SubAgentOutcome, AgentError> {
        tracing::info!(session_id = %self.session.id, "search agent started");
        drive(&mut self).await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// 依次读取 URL；单个页面最终失败时以占位文本回灌，取消直接返回
    async fn read_pages(&mut self, urls: &[String]) -> Result<(), AgentError> {
        let mut pages = Vec::with_capacity(urls.len());
        for url in urls {
            let content = match self.ctx.fetch(url).await {
                Ok(text) => text,
                Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "webpage read failed");
                    format!("{EMPTY_CONTENT} ({e})")
                }
            };
            self.ctx.emit(AgentEvent::PageRead {
                agent: self.session.agent.to_string(),
                url: url.clone(),
                chars: content.chars().count(),
            });
            pages.push((url, content));
        }
        for (url, content) in pages {
            self.session.append(Message::user(format!(
                "Webpage Content for '{url}':\n{content}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnLoop for SearchAgent {
    type Output = SubAgentOutcome;

    fn session(&self) -> &Session {
        &self.session
    }

    fn max_turns(&self) -> usize {
        self.ctx.sub_agent_max_turns
    }

    fn events(&self) -> Option<&EventSender> {
        self.ctx.events.as_ref()
    }

    async fn turn(&mut self) -> Result<Step<SubAgentOutcome>, AgentError> {
        let reply = self.ctx.complete(self.session.log().messages()).await?;
        self.session.append(Message::assistant(reply.clone()));
        let (map, classified) = self.ctx.inspect::<SearchDirective>(&reply);

        match classified.primary {
            Some(SearchDirective::QuickSearch) => {
                let queries = split_queries(map.contents("quick_search"));
                self.ctx.quick_search_round(&mut self.session, &queries).await?;
                Ok(Step::Continue)
            }
            Some(SearchDirective::WebpageRead) => {
                let urls = split_urls(map.contents("webpage_read"));
                tracing::info!(count = urls.len(), "webpage read");
                self.read_pages(&urls).await?;
                Ok(Step::Continue)
            }
            Some(SearchDirective::Report) => {
                let report = map.first("report").unwrap_or_default();
                let outcome = finish_report(
                    &self.ctx,
                    &self.session,
                    &self.instruction,
                    report,
                    SEARCH_AGENT_LOG,
                    AgentOrigin::Search,
                )
                .await?;
                Ok(Step::Terminal(outcome))
            }
            _ => {
                tracing::debug!("no actionable directive, asking the model again");
                Ok(Step::Continue)
            }
        }
    }
}

