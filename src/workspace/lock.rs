//! 任务单飞锁
//!
//! 进程内用注册表挡住重复进入；FileWorkspace 另在 `<task>/.lock` 上加 fs2 排他锁，挡住其他进程。
//! TaskGuard 在 Drop 时同时释放两者。

use std::collections::HashSet;
use std::fs::File;
use std::sync::{Arc, Mutex};

use fs2::FileExt;

use crate::workspace::WorkspaceError;

/// 进程内活跃任务注册表
#[derive(Debug, Clone, Default)]
pub struct TaskLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, task_id: &str) -> Result<TaskGuard, WorkspaceError> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(task_id.to_string()) {
            return Err(WorkspaceError::TaskBusy(task_id.to_string()));
        }
        Ok(TaskGuard {
            task_id: task_id.to_string(),
            active: self.active.clone(),
            file: None,
        })
    }

    pub fn is_locked(&self, task_id: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(task_id))
            .unwrap_or(false)
    }
}

/// 持有期间独占任务
#[derive(Debug)]
pub struct TaskGuard {
    task_id: String,
    active: Arc<Mutex<HashSet<String>>>,
    file: Option<File>,
}

impl TaskGuard {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 在锁文件上加排他锁；已被其他进程持有时返回 TaskBusy（本 guard 随之释放注册表项）
    pub(crate) fn lock_file(mut self, file: File) -> Result<Self, WorkspaceError> {
        FileExt::try_lock_exclusive(&file)
            .map_err(|_| WorkspaceError::TaskBusy(self.task_id.clone()))?;
        self.file = Some(file);
        Ok(self)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(task_id = %self.task_id, error = %e, "failed to release task lock file");
            }
        }
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.task_id);
        }
        tracing::debug!(task_id = %self.task_id, "task lock released");
    }
}
