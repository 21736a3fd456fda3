use std::path::PathBuf;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::session::UploadSession;

fn random_suffix(len: usize) -> String {
    let mut suffix = Uuid::new_v4().simple().to_string();
    suffix.truncate(len);
    suffix
}

/// 上传条目唯一标识，会话期间保持不变
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// 时间戳 + 随机后缀 + 文件名，避免同名文件冲突
    pub fn generate(name: &str) -> Self {
        Self(format!("{}_{}_{}", Utc::now().timestamp_millis(), random_suffix(8), name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 批量上传会话标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate(collection_id: &str) -> Self {
        Self(format!(
            "upload_{}_{}_{}",
            collection_id,
            Utc::now().timestamp_millis(),
            random_suffix(6)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 单个文件的上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// 等待中（在队列中）
    Pending,
    /// 上传中
    Uploading,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 已暂停
    Paused,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// 会话整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Uploading,
    Paused,
    Completed,
    /// 至少一个文件失败，仅作提示
    Error,
}

/// 文件字节来源
#[derive(Clone)]
pub enum FileSource {
    /// 本地文件
    Path(PathBuf),
    /// 内存中的数据（拖拽、剪贴板等）
    Bytes(Bytes),
}

impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// 一个待传输的文件
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    pub id: ItemId,
    /// 含虚拟目录的相对路径，例如 "contracts/2024/lease.pdf"
    pub relative_path: String,
    pub status: ItemStatus,
    /// 0-100
    pub progress: u8,
    pub uploaded_bytes: u64,
    pub total_bytes: u64,
    pub mime_type: Option<String>,
    /// 仅在 Failed 时存在
    pub error: Option<String>,
    /// 仅在 Completed 时存在
    pub storage_path: Option<String>,
    pub result_url: Option<String>,
    #[serde(skip)]
    pub source: FileSource,
}

impl UploadItem {
    pub fn new(relative_path: impl Into<String>, total_bytes: u64, source: FileSource) -> Self {
        let relative_path = relative_path.into();
        let id = ItemId::generate(file_name_of(&relative_path));
        Self::with_id(id, relative_path, total_bytes, source)
    }

    /// 使用已知 id 重建条目（例如进程重启后恢复会话）
    pub fn with_id(id: ItemId, relative_path: impl Into<String>, total_bytes: u64, source: FileSource) -> Self {
        Self {
            id,
            relative_path: relative_path.into(),
            status: ItemStatus::Pending,
            progress: 0,
            uploaded_bytes: 0,
            total_bytes,
            mime_type: None,
            error: None,
            storage_path: None,
            result_url: None,
            source,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn file_name(&self) -> &str {
        file_name_of(&self.relative_path)
    }

    /// 父目录，例如 "contracts/2024"；单独的文件返回 None
    pub fn folder(&self) -> Option<&str> {
        self.relative_path.rsplit_once('/').map(|(folder, _)| folder)
    }

    /// MIME 类型，缺失时退回到扩展名
    pub fn file_type(&self) -> String {
        if let Some(mime) = self.mime_type.as_deref().filter(|m| !m.is_empty()) {
            return mime.to_string();
        }
        match self.file_name().rsplit_once('.') {
            Some((_, ext)) => ext.to_string(),
            None => String::new(),
        }
    }
}

fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// 传输请求
#[derive(Debug, Clone, Copy)]
pub struct TransferRequest<'a> {
    /// 对象存储中的目标 key
    pub key: &'a str,
    pub source: &'a FileSource,
    pub size: u64,
    pub content_type: Option<&'a str>,
}

/// 传输成功后的对象位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub storage_key: String,
    pub url: String,
}

/// 每个完成文件写入元数据库的一行
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub parent_id: String,
    pub relative_path: String,
    pub size: u64,
    pub mime_type: String,
    pub uploaded_by: Option<String>,
    pub url: String,
    pub folder: Option<String>,
}

impl FileRecord {
    pub fn for_item(item: &UploadItem, parent_id: &str, uploaded_by: Option<&str>, url: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            relative_path: item.relative_path.clone(),
            size: item.total_bytes,
            mime_type: item.file_type(),
            uploaded_by: uploaded_by.map(str::to_string),
            url: url.to_string(),
            folder: item.folder().map(str::to_string),
        }
    }
}

/// 断点续传记录：会话中已完成的条目
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRecord {
    pub session_id: String,
    pub completed_file_ids: Vec<ItemId>,
}

/// 上传事件
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// 条目状态变更
    StateChanged {
        item_id: ItemId,
        old_status: ItemStatus,
        new_status: ItemStatus,
    },

    /// 单个文件完成
    FileCompleted(UploadItem),

    /// 本批次全部结束（completed 或 error）
    SessionFinished(UploadSession),
}

/// 对象存储 key：`{collection}/{timestamp}-{relative_path}`
pub fn storage_key(collection_id: &str, timestamp_millis: i64, relative_path: &str) -> String {
    let path = relative_path.replace('\\', "/");
    if collection_id.is_empty() {
        format!("{}-{}", timestamp_millis, path)
    } else {
        format!("{}/{}-{}", collection_id, timestamp_millis, path)
    }
}

// 静态断言确保类型是 Send的
const _: () = {
    fn assert_send<T: Send + Sync>() {}
    fn assert_types() {
        assert_send::<UploadItem>();
        assert_send::<UploadEvent>();
        assert_send::<FileSource>();
    }
};
