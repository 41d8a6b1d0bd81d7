//! 子 Agent 的终止处理：命名 → 写报告 → 保存子会话快照 → 返回结果

use serde::Serialize;

use crate::agents::events::AgentEvent;
use crate::agents::session::{AgentContext, Session};
use crate::core::AgentError;
use crate::workspace::DocumentKind;

/// 产出报告的子 Agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentOrigin {
    Search,
    Writing,
}

impl AgentOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            AgentOrigin::Search => "Search Agent",
            AgentOrigin::Writing => "Writing Agent",
        }
    }
}

/// 子 Agent 成功结束时返回给主控的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubAgentOutcome {
    pub status: String,
    pub completed: bool,
    /// 相对任务目录的路径，如 `documents/report.md`
    pub report_path: String,
    pub origin: AgentOrigin,
}

impl SubAgentOutcome {
    pub fn success(document: &str, origin: AgentOrigin) -> Self {
        Self {
            status: "success".to_string(),
            completed: true,
            report_path: format!("documents/{document}"),
            origin,
        }
    }

    /// 回灌给主控对话的摘要
    pub fn summary(&self) -> String {
        let json = serde_json::to_string_pretty(self).unwrap_or_else(|_| self.report_path.clone());
        format!("{} Result:\n{}", self.origin.label(), json)
    }
}

/// report 终止处理；报告写入失败返回 Persistence，快照失败只告警
pub(crate) async fn finish_report(
    ctx: &AgentContext,
    session: &Session,
    instruction: &str,
    report: &str,
    snapshot_name: &str,
    origin: AgentOrigin,
) -> Result<SubAgentOutcome, AgentError> {
    let name = ctx
        .cancellable(async { Ok::<_, AgentError>(ctx.namer.name_for(instruction).await) })
        .await?;

    ctx.workspace
        .save(&session.task_id, DocumentKind::Document, &name, report)
        .await
        .map_err(|e| AgentError::Persistence(format!("failed to save {name}: {e}")))?;
    tracing::info!(document = %name, chars = report.chars().count(), "report saved");
    ctx.emit(AgentEvent::DocumentSaved { name: name.clone() });

    match session.log().to_json() {
        Ok(json) => {
            if let Err(e) = ctx
                .workspace
                .save(&session.task_id, DocumentKind::ConversationLog, snapshot_name, &json)
                .await
            {
                tracing::warn!(snapshot = %snapshot_name, error = %e, "failed to save sub-agent history");
            }
        }
        Err(e) => tracing::warn!(snapshot = %snapshot_name, error = %e, "failed to serialize sub-agent history"),
    }

    Ok(SubAgentOutcome::success(&name, origin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_shape() {
        let o = SubAgentOutcome::success("a.md", AgentOrigin::Writing);
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["status"], "success");
        assert_eq!(v["completed"], true);
        assert_eq!(v["report_path"], "documents/a.md");
        assert_eq!(v["origin"], "writing");
        assert!(o.summary().starts_with("Writing Agent Result:\n"));
    }
}
