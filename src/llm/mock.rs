//! 脚本化 Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序返回预设回复；脚本耗尽后若设置了 fallback 则一直返回 fallback，
//! 否则返回 ApiError。记录每次调用收到的完整消息列表，便于断言对话内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 脚本耗尽后重复返回的回复
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Ok(reply.into()));
        }
    }

    pub fn push_error(&self, err: LlmError) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(Err(err));
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// 每次调用收到的消息列表快照
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut c) = self.calls.lock() {
            c.push(messages.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::ApiError("script exhausted".to_string())),
        }
    }
}
