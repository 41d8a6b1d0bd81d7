//! 无界面运行时
//!
//! create_agent_context 按配置装配模型、搜索后端、网页读取、任务目录与提示词；
//! open_task 独占任务并恢复对话；process_message 处理一条输入，
//! 可恢复的错误经 RecoveryEngine 转为用户可见消息，其余错误向上抛出。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::agents::{AgentContext, ControllerSession, EventSender, LlmDocumentNamer, Prompts};
use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::llm::{create_llm_from_config, create_naming_llm_from_config};
use crate::tools::{
    GoogleSearch, PageReader, SearchProvider, ToolGateway, TranscriptReader, WebReader,
    ZhipuSearch,
};
use crate::workspace::{FileWorkspace, TaskWorkspace};

/// 按 [tools.search].provider 选择搜索后端
pub fn create_search_provider(cfg: &AppConfig) -> Result<Arc<dyn SearchProvider>, AgentError> {
    let section = &cfg.tools.search;
    match section.provider.trim().to_lowercase().as_str() {
        "google" => Ok(Arc::new(GoogleSearch::from_env(section)?)),
        "zhipu" => Ok(Arc::new(ZhipuSearch::from_env(section)?)),
        other => Err(AgentError::ConfigError(format!(
            "unknown search provider: {other}"
        ))),
    }
}

/// 装配会话共享依赖
pub fn create_agent_context(
    cfg: &AppConfig,
    cancel: CancellationToken,
    events: Option<EventSender>,
) -> Result<AgentContext, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    let naming_llm = create_naming_llm_from_config(cfg)?;

    let reader: Arc<dyn PageReader> = Arc::new(WebReader::new(&cfg.tools.fetch));
    let transcripts: Arc<dyn PageReader> = Arc::new(TranscriptReader::new(&cfg.tools.fetch));
    let gateway = ToolGateway::new(
        create_search_provider(cfg)?,
        reader,
        transcripts,
        cfg.tools.tool_timeout_secs,
    );

    let workspace: Arc<dyn TaskWorkspace> = Arc::new(FileWorkspace::new(&cfg.app.tasks_root));
    tracing::info!(
        tasks_root = %cfg.app.tasks_root.display(),
        search = %cfg.tools.search.provider,
        "runtime ready"
    );

    Ok(AgentContext {
        llm,
        gateway: Arc::new(gateway),
        workspace,
        namer: Arc::new(LlmDocumentNamer::new(naming_llm)),
        prompts: Arc::new(Prompts::load(None)),
        tool_retry: cfg.llm.retry.to_retry_config(),
        max_turns: cfg.app.max_turns,
        sub_agent_max_turns: cfg.app.sub_agent_max_turns,
        cancel,
        events,
    })
}

/// 打开（或新建）任务的主控会话；任务被占用时返回 TaskBusy
pub async fn open_task(
    ctx: AgentContext,
    task_id: Option<String>,
) -> Result<ControllerSession, AgentError> {
    let session = ControllerSession::open(ctx, task_id).await?;
    tracing::info!(task_id = %session.task_id(), "task opened");
    Ok(session)
}

/// 处理单条用户输入，返回给用户的文本
///
/// 可恢复的错误（Dispatch、上游失败、循环守卫等）变成一条提示消息，会话继续可用；
/// 取消、任务占用、配置错误原样返回，由调用方结束会话。
pub async fn process_message(
    session: &mut ControllerSession,
    recovery: &RecoveryEngine,
    input: &str,
) -> Result<String, AgentError> {
    match session.process_input(input).await {
        Ok(reply) => Ok(reply),
        Err(e) => match recovery.handle(&e) {
            RecoveryAction::NotifyUser(msg) => {
                tracing::warn!(error = %e, "turn failed, session continues");
                Ok(msg)
            }
            RecoveryAction::Abort => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_search_provider() {
        let mut cfg = AppConfig::default();
        cfg.tools.search.provider = "bing".to_string();
        let err = create_search_provider(&cfg).err().unwrap();
        assert!(matches!(err, AgentError::ConfigError(ref m) if m.contains("bing")));
    }

    #[test]
    fn test_unknown_llm_provider_is_config_error() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "nope".to_string();
        let err = create_agent_context(&cfg, CancellationToken::new(), None)
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::ConfigError(_)));
    }
}
