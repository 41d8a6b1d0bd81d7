//! 写作子 Agent
//!
//! 系统提示词附带任务当前的文档列表、待办清单与每个文档的前 200 字预览。
//! 指令：file_read（按名读取任务文档）> report（终止，写文档）。

use async_trait::async_trait;

use crate::agents::events::{AgentEvent, EventSender};
use crate::agents::outcome::{finish_report, AgentOrigin, SubAgentOutcome};
use crate::agents::prompts::{writing_agent_system_prompt, DocumentPreview};
use crate::agents::session::{drive, AgentContext, Session, Step, TurnLoop};
use crate::core::AgentError;
use crate::directive::{split_queries, WritingDirective};
use crate::memory::Message;
use crate::workspace::{DocumentKind, TODO_LIST, WRITING_AGENT_LOG};

pub struct WritingAgent {
    ctx: AgentContext,
    session: Session,
    instruction: String,
}

/// file_read 里的名字可能带目录（如 documents/a.md），只取文件名
fn document_name(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| "'\"`".contains(c))
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
}

impl WritingAgent {
    /// 读取任务文档构造系统提示词后建立会话
    pub async fn new(ctx: AgentContext, task_id: &str, instruction: &str) -> Result<Self, AgentError> {
        let names = ctx.workspace.list_documents(task_id).await?;
        let mut previews = Vec::with_capacity(names.len());
        let mut todo_list = None;
        for name in names {
            let content = ctx
                .workspace
                .load(task_id, DocumentKind::Document, &name)
                .await?
                .unwrap_or_default();
            if name == TODO_LIST {
                todo_list = Some(content.clone());
            }
            previews.push(DocumentPreview::new(name, &content));
        }
        let system =
            writing_agent_system_prompt(&ctx.prompts.writing_agent, &previews, todo_list.as_deref());

        let mut session = Session::new(task_id, "writing_agent");
        session.append(Message::system(system));
        session.append(Message::user(instruction));
        Ok(Self {
            ctx,
            session,
            instruction: instruction.to_string(),
        })
    }

    pub async fn run(mut self) -> Result<SubAgentOutcome, AgentError> {
        tracing::info!(session_id = %self.session.id, "writing agent started");
        drive(&mut self).await
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    async fn read_files(&mut self, names: &[String]) -> Result<(), AgentError> {
        let mut turns = Vec::with_capacity(names.len());
        for raw in names {
            let name = document_name(raw);
            let content = match self
                .ctx
                .workspace
                .load(&self.session.task_id, DocumentKind::Document, name)
                .await
            {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(name = %raw, error = %e, "file read rejected");
                    None
                }
            };
            self.ctx.emit(AgentEvent::FileRead {
                agent: self.session.agent.to_string(),
                name: name.to_string(),
                found: content.is_some(),
            });
            turns.push(match content {
                Some(text) => format!("File Content ({raw}):\n{text}"),
                None => format!("File Content ({raw}):\nDocument not found: {raw}"),
            });
        }
        for turn in turns {
            self.session.append(Message::user(turn));
        }
        Ok(())
    }
}

#[async_trait]
impl TurnLoop for WritingAgent {
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
        let (map, classified) = self.ctx.inspect::<WritingDirective>(&reply);

        match classified.primary {
            Some(WritingDirective::FileRead) => {
                // file_read 与 quick_search 一样按逗号分隔
                let names = split_queries(map.contents("file_read"));
                tracing::info!(count = names.len(), "file read");
                self.read_files(&names).await?;
                Ok(Step::Continue)
            }
            Some(WritingDirective::Report) => {
                let report = map.first("report").unwrap_or_default();
                let outcome = finish_report(
                    &self.ctx,
                    &self.session,
                    &self.instruction,
                    report,
                    WRITING_AGENT_LOG,
                    AgentOrigin::Writing,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_name() {
        assert_eq!(document_name(" documents/a.md "), "a.md");
        assert_eq!(document_name("'b.md'"), "b.md");
        assert_eq!(document_name("c.md"), "c.md");
    }
}
