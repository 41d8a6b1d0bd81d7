//! 主控会话
//!
//! 每轮：system + 日志 → 模型 → 追加助手消息 → 解析 → 副作用 → 按主指令（固定优先级）调度：
//! 1. todo_list：覆盖写 todo_list.md（仅副作用）
//! 2. writing_agent：新建写作子 Agent，结果摘要作为 user 消息回灌，继续
//! 3. search_agent：同上，换成搜索子 Agent（内容为空则 Dispatch 错误，不创建子 Agent）
//! 4. quick_search：逗号拆分后并发搜索，按顺序回灌，继续
//! 5. 否则终止：返回第一条 message_ask_user，没有则返回空串
//!
//! message_notify_user 只发进度事件，不影响控制流。

use async_trait::async_trait;

use crate::agents::events::{preview, AgentEvent, EventSender};
use crate::agents::search_agent::SearchAgent;
use crate::agents::session::{drive, AgentContext, Session, Step, TurnLoop};
use crate::agents::writing_agent::WritingAgent;
use crate::core::AgentError;
use crate::directive::{split_queries, ControllerDirective, DirectiveMap};
use crate::memory::{ConversationLog, Message};
use crate::workspace::{DocumentKind, TaskGuard, CONVERSATION_LOG, TODO_LIST};

/// 委派事件里指令的预览长度
const INSTRUCTION_PREVIEW_CHARS: usize = 120;

/// 新任务的默认 ID：本地时间戳
pub fn default_task_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

pub struct ControllerSession {
    ctx: AgentContext,
    session: Session,
    _guard: TaskGuard,
}

impl ControllerSession {
    /// 独占任务并恢复已有对话（chat_history/conversation.json）；task_id 为空时新建
    pub async fn open(ctx: AgentContext, task_id: Option<String>) -> Result<Self, AgentError> {
        let task_id = task_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(default_task_id);
        let guard = ctx.workspace.lock_task(&task_id)?;

        let log = match ctx
            .workspace
            .load(&task_id, DocumentKind::ConversationLog, CONVERSATION_LOG)
            .await?
        {
            Some(json) => match ConversationLog::from_json(&json) {
                Ok(log) => {
                    tracing::info!(task_id = %task_id, messages = log.len(), "conversation resumed");
                    log
                }
                Err(e) => {
                    tracing::warn!(task_id = %task_id, error = %e, "unreadable conversation history, starting fresh");
                    ConversationLog::new()
                }
            },
            None => ConversationLog::new(),
        };

        Ok(Self {
            session: Session::with_log(task_id, "controller", log),
            ctx,
            _guard: guard,
        })
    }

    pub fn task_id(&self) -> &str {
        &self.session.task_id
    }

    pub fn log(&self) -> &ConversationLog {
        self.session.log()
    }

    /// 处理一条用户输入，返回给用户的消息（可能为空串）；无论成败都保存对话
    pub async fn process_input(&mut self, input: &str) -> Result<String, AgentError> {
        tracing::info!(parent: self.session.span(), input = %preview(input, 200), "user input");
        self.session.append(Message::user(input));

        let result = drive(&mut *self).await;
        if let Err(e) = &result {
            self.ctx.emit(AgentEvent::Error {
                text: e.to_string(),
            });
        }
        self.save_log().await;
        result
    }

    async fn save_log(&self) {
        let json = match self.session.log().to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize conversation");
                return;
            }
        };
        if let Err(e) = self
            .ctx
            .workspace
            .save(self.task_id(), DocumentKind::ConversationLog, CONVERSATION_LOG, &json)
            .await
        {
            tracing::warn!(task_id = %self.task_id(), error = %e, "failed to save conversation");
        }
    }

    /// 非主指令的副作用：通知、规划、待办清单
    async fn apply_side_effects(&self, map: &DirectiveMap) {
        for text in map.contents("message_notify_user") {
            tracing::info!(notify = %text, "notify user");
            self.ctx.emit(AgentEvent::Notify {
                text: text.to_string(),
            });
        }
        for text in map.contents("planning") {
            tracing::debug!(planning = %text, "planning");
        }
        for text in map.contents("task_output") {
            tracing::debug!(task_output = %text, "task output");
        }

        // 多次出现时以最后一版为准
        if let Some(todo) = map.contents("todo_list").last() {
            match self
                .ctx
                .workspace
                .save(self.task_id(), DocumentKind::Document, TODO_LIST, todo)
                .await
            {
                Ok(()) => {
                    tracing::info!("todo list saved");
                    self.ctx.emit(AgentEvent::DocumentSaved {
                        name: TODO_LIST.to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to save todo list");
                    self.ctx.emit(AgentEvent::Error {
                        text: format!("failed to save {TODO_LIST}: {e}"),
                    });
                }
            }
        }
    }

    /// 委派指令的内容；标记存在但为空时是 Dispatch 错误
    fn instruction<'m>(map: &'m DirectiveMap, name: &str) -> Result<&'m str, AgentError> {
        map.first(name)
            .ok_or_else(|| AgentError::Dispatch(format!("{name} has no instruction")))
    }

    fn announce(&self, target: &str, instruction: &str) {
        tracing::info!(target = %target, "delegating");
        self.ctx.emit(AgentEvent::Delegation {
            target: target.to_string(),
            instruction: preview(instruction, INSTRUCTION_PREVIEW_CHARS),
        });
    }
}

#[async_trait]
impl TurnLoop for ControllerSession {
    type Output = String;

    fn session(&self) -> &Session {
        &self.session
    }

    fn max_turns(&self) -> usize {
        self.ctx.max_turns
    }

    fn events(&self) -> Option<&EventSender> {
        self.ctx.events.as_ref()
    }

    async fn turn(&mut self) -> Result<Step<String>, AgentError> {
        let mut messages = Vec::with_capacity(self.session.log().len() + 1);
        messages.push(Message::system(self.ctx.prompts.controller.clone()));
        messages.extend_from_slice(self.session.log().messages());

        let reply = self.ctx.complete(&messages).await?;
        self.session.append(Message::assistant(reply.clone()));
        let (map, classified) = self.ctx.inspect::<ControllerDirective>(&reply);

        self.apply_side_effects(&map).await;

        match classified.primary {
            Some(ControllerDirective::WritingAgent) => {
                let instruction = Self::instruction(&map, "writing_agent")?;
                self.announce("writing_agent", instruction);
                let agent = WritingAgent::new(self.ctx.clone(), self.task_id(), instruction).await?;
                let outcome = agent.run().await?;
                self.session.append(Message::user(outcome.summary()));
                Ok(Step::Continue)
            }
            Some(ControllerDirective::SearchAgent) => {
                let instruction = Self::instruction(&map, "search_agent")?;
                self.announce("search_agent", instruction);
                let outcome = SearchAgent::new(self.ctx.clone(), self.task_id(), instruction)
                    .run()
                    .await?;
                self.session.append(Message::user(outcome.summary()));
                Ok(Step::Continue)
            }
            Some(ControllerDirective::QuickSearch) => {
                let queries = split_queries(map.contents("quick_search"));
                self.ctx.quick_search_round(&mut self.session, &queries).await?;
                Ok(Step::Continue)
            }
            _ => {
                let reply_to_user = map.first("message_ask_user").unwrap_or_default().to_string();
                tracing::info!(chars = reply_to_user.chars().count(), "returning to user");
                Ok(Step::Terminal(reply_to_user))
            }
        }
    }
}
