//! 内存工作区：不落盘，语义与 FileWorkspace 一致（名字校验、覆盖写、单飞锁）

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::workspace::{
    validate_component, DocumentKind, TaskGuard, TaskLocks, TaskWorkspace, WorkspaceError,
};

type Key = (String, DocumentKind, String);

#[derive(Debug, Default)]
pub struct InMemoryWorkspace {
    entries: Mutex<BTreeMap<Key, String>>,
    locks: TaskLocks,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(task_id: &str, kind: DocumentKind, name: &str) -> Result<Key, WorkspaceError> {
        Ok((
            validate_component(task_id)?.to_string(),
            kind,
            validate_component(name)?.to_string(),
        ))
    }

    /// 当前条目数（测试断言用）
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskWorkspace for InMemoryWorkspace {
    async fn save(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
        content: &str,
    ) -> Result<(), WorkspaceError> {
        let key = Self::key(task_id, kind, name)?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, content.to_string());
        Ok(())
    }

    async fn load(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
    ) -> Result<Option<String>, WorkspaceError> {
        let key = Self::key(task_id, kind, name)?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&key).cloned())
    }

    async fn list_documents(&self, task_id: &str) -> Result<Vec<String>, WorkspaceError> {
        let task_id = validate_component(task_id)?;
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .keys()
            .filter(|(t, k, _)| t == task_id && *k == DocumentKind::Document)
            .map(|(_, _, name)| name.clone())
            .collect())
    }

    fn lock_task(&self, task_id: &str) -> Result<TaskGuard, WorkspaceError> {
        self.locks.acquire(validate_component(task_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_load_list() {
        let ws = InMemoryWorkspace::new();
        ws.save("t", DocumentKind::Document, "z.md", "z").await.unwrap();
        ws.save("t", DocumentKind::Document, "a.md", "a").await.unwrap();
        ws.save("t", DocumentKind::ConversationLog, "conversation.json", "[]")
            .await
            .unwrap();
        ws.save("other", DocumentKind::Document, "b.md", "b").await.unwrap();

        assert_eq!(ws.list_documents("t").await.unwrap(), vec!["a.md", "z.md"]);
        assert_eq!(
            ws.load("t", DocumentKind::Document, "a.md").await.unwrap(),
            Some("a".to_string())
        );
        assert_eq!(ws.load("t", DocumentKind::Document, "b.md").await.unwrap(), None);
        assert_eq!(ws.len(), 4);
    }

    #[tokio::test]
    async fn test_invalid_names_and_lock() {
        let ws = InMemoryWorkspace::new();
        assert!(ws
            .save("t", DocumentKind::Document, "../x", "")
            .await
            .is_err());
        let g = ws.lock_task("t").unwrap();
        assert!(matches!(ws.lock_task("t"), Err(WorkspaceError::TaskBusy(_))));
        drop(g);
        assert!(ws.lock_task("t").is_ok());
    }
}
