use std::collections::HashSet;
use chrono::{DateTime, Utc};
use serde::Serialize;
use super::progress;
use super::types::{ItemId, ItemStatus, SessionId, SessionStatus, UploadItem};

/// 对单个条目的修改，所有状态变更都经过 [`UploadSession::apply`]
#[derive(Debug, Clone)]
pub enum ItemPatch {
    /// Pending -> Uploading
    Started,
    /// 累计已上传字节
    Progress { uploaded_bytes: u64 },
    Completed { storage_path: String, result_url: String },
    /// 断点记录中已完成，不需要重新传输
    Restored,
    Failed { reason: String },
    Paused,
    /// Paused/Failed -> Pending
    Requeued { reset_progress: bool },
}

/// 条目状态迁移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub old_status: ItemStatus,
    pub new_status: ItemStatus,
}

/// 一个批量上传会话
///
/// 统计字段只在 `recompute` 中根据 `items` 重新计算，外部只读。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    session_id: Option<SessionId>,
    items: Vec<UploadItem>,
    status: SessionStatus,
    total_files: usize,
    completed_files: usize,
    failed_files: usize,
    total_bytes: u64,
    uploaded_bytes: u64,
    started_at: Option<DateTime<Utc>>,
    /// 预计剩余秒数
    eta: Option<u64>,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            session_id: None,
            items: Vec::new(),
            status: SessionStatus::Idle,
            total_files: 0,
            completed_files: 0,
            failed_files: 0,
            total_bytes: 0,
            uploaded_bytes: 0,
            started_at: None,
            eta: None,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }

    pub fn item(&self, id: &ItemId) -> Option<&UploadItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn total_files(&self) -> usize {
        self.total_files
    }

    pub fn completed_files(&self) -> usize {
        self.completed_files
    }

    pub fn failed_files(&self) -> usize {
        self.failed_files
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn eta(&self) -> Option<u64> {
        self.eta
    }

    pub fn count(&self, status: ItemStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    pub fn ids_with_status(&self, status: ItemStatus) -> Vec<ItemId> {
        self.items
            .iter()
            .filter(|item| item.status == status)
            .map(|item| item.id.clone())
            .collect()
    }

    pub(crate) fn set_session_id(&mut self, session_id: SessionId) {
        self.session_id = Some(session_id);
    }

    pub(crate) fn append(&mut self, items: Vec<UploadItem>) {
        self.items.extend(items);
        self.recompute();
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status == SessionStatus::Uploading && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.recompute();
    }

    /// 应用修改并重新计算统计；不适用的修改返回 None
    pub(crate) fn apply(&mut self, id: &ItemId, patch: ItemPatch) -> Option<Transition> {
        let item = self.items.iter_mut().find(|item| &item.id == id)?;
        let old_status = item.status;

        match patch {
            ItemPatch::Started => {
                if old_status != ItemStatus::Pending {
                    return None;
                }
                item.status = ItemStatus::Uploading;
            }
            ItemPatch::Progress { uploaded_bytes } => {
                if old_status != ItemStatus::Uploading {
                    return None;
                }
                // 只增不减
                let uploaded = uploaded_bytes.min(item.total_bytes);
                if uploaded > item.uploaded_bytes {
                    item.uploaded_bytes = uploaded;
                    item.progress = item.progress.max(progress::percent(uploaded, item.total_bytes));
                }
            }
            ItemPatch::Completed { storage_path, result_url } => {
                if old_status.is_terminal() {
                    return None;
                }
                item.status = ItemStatus::Completed;
                item.uploaded_bytes = item.total_bytes;
                item.progress = 100;
                item.error = None;
                item.storage_path = Some(storage_path);
                item.result_url = Some(result_url);
            }
            ItemPatch::Restored => {
                if old_status == ItemStatus::Completed {
                    return None;
                }
                item.status = ItemStatus::Completed;
                item.uploaded_bytes = item.total_bytes;
                item.progress = 100;
                item.error = None;
            }
            ItemPatch::Failed { reason } => {
                if old_status != ItemStatus::Uploading {
                    return None;
                }
                item.status = ItemStatus::Failed;
                item.error = Some(reason);
            }
            ItemPatch::Paused => {
                if old_status != ItemStatus::Uploading {
                    return None;
                }
                item.status = ItemStatus::Paused;
            }
            ItemPatch::Requeued { reset_progress } => {
                if !matches!(old_status, ItemStatus::Paused | ItemStatus::Failed) {
                    return None;
                }
                item.status = ItemStatus::Pending;
                item.error = None;
                if reset_progress {
                    item.progress = 0;
                    item.uploaded_bytes = 0;
                }
            }
        }

        let new_status = item.status;
        self.recompute();

        Some(Transition { old_status, new_status })
    }

    /// 把断点记录中的条目标记为已完成
    pub(crate) fn restore_completed(&mut self, completed: &HashSet<ItemId>) -> Vec<(ItemId, Transition)> {
        let ids: Vec<ItemId> = self
            .items
            .iter()
            .filter(|item| item.status != ItemStatus::Completed && completed.contains(&item.id))
            .map(|item| item.id.clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                let transition = self.apply(&id, ItemPatch::Restored)?;
                Some((id, transition))
            })
            .collect()
    }

    pub(crate) fn recompute(&mut self) {
        self.total_files = self.items.len();
        self.completed_files = self.count(ItemStatus::Completed);
        self.failed_files = self.count(ItemStatus::Failed);
        self.total_bytes = self.items.iter().map(|item| item.total_bytes).sum();
        self.uploaded_bytes = self.items.iter().map(|item| item.uploaded_bytes).sum();

        let speed = match self.started_at {
            Some(started_at) => progress::throughput(self.uploaded_bytes, Utc::now() - started_at),
            None => 0.0,
        };
        self.eta = progress::eta_seconds(self.total_bytes, self.uploaded_bytes, speed);

        let done = self.completed_files + self.failed_files;
        // 暂停期间保持 Paused
        let running = matches!(self.status, SessionStatus::Uploading | SessionStatus::Completed | SessionStatus::Error);
        if running && self.total_files > 0 && done == self.total_files {
            self.status = if self.failed_files > 0 {
                SessionStatus::Error
            } else {
                SessionStatus::Completed
            };
        }
    }
}
