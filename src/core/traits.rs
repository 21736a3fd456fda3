use std::sync::Arc;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use super::errors::{PersistenceError, TransferError};
use super::types::{FileRecord, ResumeRecord, StoredObject, TransferRequest};

/// 进度回调，参数为累计已上传字节数
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// 传输单元 - 上传单个文件
#[async_trait]
pub trait Uploader: Send + Sync {
    /// 上传一个文件
    ///
    /// 需要按字节报告进度；`cancel` 触发时中止并返回 [`TransferError::Cancelled`]。
    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<StoredObject, TransferError>;
}

/// 断点记录的持久化 KV 存储，按 session id 索引
#[async_trait]
pub trait ResumeStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<ResumeRecord>, PersistenceError>;

    /// 覆盖写入
    async fn put(&self, record: &ResumeRecord) -> Result<(), PersistenceError>;

    async fn remove(&self, session_id: &str) -> Result<(), PersistenceError>;
}

/// 元数据库 - 每个完成的文件插入一条记录
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert(&self, record: &FileRecord) -> Result<(), PersistenceError>;
}

/// 访问令牌来源
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

/// 固定令牌
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Option<String> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}
