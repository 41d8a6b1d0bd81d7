//! 文件系统工作区
//!
//! 目录布局：
//! ```text
//! <tasks_root>/<task_id>/chat_history/{conversation,search_agent,writing_agent}.json
//! <tasks_root>/<task_id>/documents/<name>
//! <tasks_root>/<task_id>/logs/
//! ```
//! 写入先落临时文件再 rename，不会留下写了一半的文档。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::workspace::{
    validate_component, DocumentKind, TaskGuard, TaskLocks, TaskWorkspace, WorkspaceError,
};

#[derive(Debug, Clone)]
pub struct FileWorkspace {
    root: PathBuf,
    locks: TaskLocks,
}

impl FileWorkspace {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            locks: TaskLocks::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn task_dir(&self, task_id: &str) -> Result<PathBuf, WorkspaceError> {
        Ok(self.root.join(validate_component(task_id)?))
    }

    fn kind_dir(&self, task_id: &str, kind: DocumentKind) -> Result<PathBuf, WorkspaceError> {
        let sub = match kind {
            DocumentKind::ConversationLog => "chat_history",
            DocumentKind::Document => "documents",
        };
        Ok(self.task_dir(task_id)?.join(sub))
    }

    /// 创建任务目录骨架（chat_history / documents / logs）
    pub async fn ensure_task(&self, task_id: &str) -> Result<PathBuf, WorkspaceError> {
        let dir = self.task_dir(task_id)?;
        for sub in ["chat_history", "documents", "logs"] {
            fs::create_dir_all(dir.join(sub)).await?;
        }
        Ok(dir)
    }
}

/// 临时文件 + rename 的原子写入
async fn write_atomic(dir: &Path, name: &str, content: &str) -> Result<(), WorkspaceError> {
    fs::create_dir_all(dir).await?;
    // 临时名不含目标名，长文件名不会因前后缀超限
    let tmp = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let target = dir.join(name);

    let write = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, &target).await
    };
    if let Err(e) = write.await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[async_trait]
impl TaskWorkspace for FileWorkspace {
    async fn save(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
        content: &str,
    ) -> Result<(), WorkspaceError> {
        let name = validate_component(name)?;
        let dir = self.kind_dir(task_id, kind)?;
        write_atomic(&dir, name, content).await?;
        tracing::debug!(task_id = %task_id, kind = ?kind, name = %name, bytes = content.len(), "saved");
        Ok(())
    }

    async fn load(
        &self,
        task_id: &str,
        kind: DocumentKind,
        name: &str,
    ) -> Result<Option<String>, WorkspaceError> {
        let name = validate_component(name)?;
        let path = self.kind_dir(task_id, kind)?.join(name);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_documents(&self, task_id: &str) -> Result<Vec<String>, WorkspaceError> {
        let dir = self.kind_dir(task_id, DocumentKind::Document)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && !name.starts_with('.') {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn lock_task(&self, task_id: &str) -> Result<TaskGuard, WorkspaceError> {
        let dir = self.task_dir(task_id)?;
        let guard = self.locks.acquire(task_id)?;
        std::fs::create_dir_all(&dir)?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(".lock"))?;
        guard.lock_file(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_layout_and_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FileWorkspace::new(tmp.path());
        ws.ensure_task("t1").await.unwrap();
        for sub in ["chat_history", "documents", "logs"] {
            assert!(tmp.path().join("t1").join(sub).is_dir());
        }

        ws.save("t1", DocumentKind::ConversationLog, "conversation.json", "[]")
            .await
            .unwrap();
        ws.save("t1", DocumentKind::Document, "report.md", "# R")
            .await
            .unwrap();
        assert!(tmp.path().join("t1/chat_history/conversation.json").is_file());
        assert!(tmp.path().join("t1/documents/report.md").is_file());

        assert_eq!(
            ws.load("t1", DocumentKind::Document, "report.md").await.unwrap(),
            Some("# R".to_string())
        );
        assert_eq!(
            ws.load("t1", DocumentKind::Document, "missing.md").await.unwrap(),
            None
        );
        // 不同类别互不可见
        assert_eq!(
            ws.load("t1", DocumentKind::Document, "conversation.json")
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_overwrite_and_list() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FileWorkspace::new(tmp.path());
        assert!(ws.list_documents("empty").await.unwrap().is_empty());

        ws.save("t", DocumentKind::Document, "b.md", "1").await.unwrap();
        ws.save("t", DocumentKind::Document, "a.md", "2").await.unwrap();
        ws.save("t", DocumentKind::Document, "b.md", "3").await.unwrap();

        assert_eq!(ws.list_documents("t").await.unwrap(), vec!["a.md", "b.md"]);
        assert_eq!(
            ws.load("t", DocumentKind::Document, "b.md").await.unwrap(),
            Some("3".to_string())
        );
        // 没有残留临时文件
        let leftovers = std::fs::read_dir(tmp.path().join("t/documents"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_path_escape_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FileWorkspace::new(tmp.path().join("tasks"));
        let err = ws
            .save("t", DocumentKind::Document, "../../evil.md", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidName(_)));
        assert!(ws.task_dir("../t").is_err());
        assert!(!tmp.path().join("evil.md").exists());
    }

    #[tokio::test]
    async fn test_longest_valid_name_saves() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FileWorkspace::new(tmp.path());
        let name = format!("{}.md", "n".repeat(crate::workspace::NAME_MAX_BYTES - 3));
        ws.save("t", DocumentKind::Document, &name, "body").await.unwrap();
        assert_eq!(
            ws.load("t", DocumentKind::Document, &name).await.unwrap(),
            Some("body".to_string())
        );

        let err = ws
            .save("t", DocumentKind::Document, &format!("n{name}"), "body")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidName(_)));
    }

    #[test]
    fn test_lock_task_single_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let ws = FileWorkspace::new(tmp.path());
        let guard = ws.lock_task("t1").unwrap();
        assert!(matches!(ws.lock_task("t1"), Err(WorkspaceError::TaskBusy(_))));

        // 另一个实例（模拟另一进程）被文件锁挡住
        let other = FileWorkspace::new(tmp.path());
        assert!(matches!(other.lock_task("t1"), Err(WorkspaceError::TaskBusy(_))));

        drop(guard);
        assert!(ws.lock_task("t1").is_ok());
    }
}
