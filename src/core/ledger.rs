use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use super::store::MemoryStore;
use super::traits::ResumeStore;
use super::types::{ItemId, ResumeRecord, SessionId};

/// 断点续传记录
///
/// 记录每个会话中已经完成的条目。写入失败只记录日志，不影响上传结果。
/// 多个 worker 并发完成时通过 `record_completed` 串行写入，每次写入的都是完整列表。
#[derive(Clone)]
pub struct ResumeLedger {
    store: Arc<dyn ResumeStore>,
    completed: Arc<Mutex<HashMap<SessionId, Vec<ItemId>>>>,
}

impl ResumeLedger {
    pub fn new(store: Arc<dyn ResumeStore>) -> Self {
        Self {
            store,
            completed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// 覆盖写入
    pub async fn save(&self, session_id: &SessionId, completed_ids: &[ItemId]) {
        let mut cache = self.completed.lock().await;
        cache.insert(session_id.clone(), completed_ids.to_vec());
        self.persist(session_id, completed_ids).await;
    }

    /// 读取已完成的条目，没有记录时返回空列表
    pub async fn load(&self, session_id: &SessionId) -> Vec<ItemId> {
        let mut cache = self.completed.lock().await;
        let ids = self.load_from_store(session_id).await;
        cache.insert(session_id.clone(), ids.clone());
        ids
    }

    pub async fn delete(&self, session_id: &SessionId) {
        let mut cache = self.completed.lock().await;
        cache.remove(session_id);
        if let Err(err) = self.store.remove(session_id.as_str()).await {
            tracing::warn!(session = %session_id, error = %err, "failed to delete resume record");
        }
    }

    /// 追加一个已完成的条目并写入完整列表
    pub async fn record_completed(&self, session_id: &SessionId, item_id: &ItemId) {
        let mut cache = self.completed.lock().await;
        if !cache.contains_key(session_id) {
            let ids = self.load_from_store(session_id).await;
            cache.insert(session_id.clone(), ids);
        }

        let Some(ids) = cache.get_mut(session_id) else { return };
        if ids.contains(item_id) {
            return;
        }
        ids.push(item_id.clone());

        let snapshot = ids.clone();
        self.persist(session_id, &snapshot).await;
    }

    async fn load_from_store(&self, session_id: &SessionId) -> Vec<ItemId> {
        match self.store.get(session_id.as_str()).await {
            Ok(Some(record)) => record.completed_file_ids,
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(session = %session_id, error = %err, "failed to load resume record");
                Vec::new()
            }
        }
    }

    async fn persist(&self, session_id: &SessionId, completed_ids: &[ItemId]) {
        let record = ResumeRecord {
            session_id: session_id.as_str().to_string(),
            completed_file_ids: completed_ids.to_vec(),
        };
        if let Err(err) = self.store.put(&record).await {
            tracing::warn!(session = %session_id, error = %err, "failed to save resume record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::core::errors::PersistenceError;

    struct BrokenStore;

    #[async_trait]
    impl ResumeStore for BrokenStore {
        async fn get(&self, _session_id: &str) -> Result<Option<ResumeRecord>, PersistenceError> {
            Err(std::io::Error::other("disk gone").into())
        }

        async fn put(&self, _record: &ResumeRecord) -> Result<(), PersistenceError> {
            Err(std::io::Error::other("disk gone").into())
        }

        async fn remove(&self, _session_id: &str) -> Result<(), PersistenceError> {
            Err(std::io::Error::other("disk gone").into())
        }
    }

    #[tokio::test]
    async fn test_load_missing_session_is_empty() {
        let ledger = ResumeLedger::in_memory();
        assert!(ledger.load(&SessionId::new("nope")).await.is_empty());
    }

    #[tokio::test]
    async fn test_save_is_last_write_wins() {
        let ledger = ResumeLedger::in_memory();
        let session = SessionId::new("s");

        ledger.save(&session, &[ItemId::new("a"), ItemId::new("b")]).await;
        ledger.save(&session, &[ItemId::new("c")]).await;
        assert_eq!(ledger.load(&session).await, vec![ItemId::new("c")]);

        ledger.delete(&session).await;
        assert!(ledger.load(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_are_a_superset() {
        let store = Arc::new(MemoryStore::new());
        let ledger = ResumeLedger::new(store.clone());
        let session = SessionId::new("s");

        let mut handles = Vec::new();
        for i in 0..20 {
            let ledger = ledger.clone();
            let session = session.clone();
            handles.push(tokio::spawn(async move {
                ledger.record_completed(&session, &ItemId::new(format!("item-{}", i))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.get("s").await.unwrap().unwrap();
        assert_eq!(record.completed_file_ids.len(), 20);

        // 重复记录不会产生重复 id
        ledger.record_completed(&session, &ItemId::new("item-3")).await;
        assert_eq!(ledger.load(&session).await.len(), 20);
    }

    #[tokio::test]
    async fn test_persistence_errors_are_swallowed() {
        let ledger = ResumeLedger::new(Arc::new(BrokenStore));
        let session = SessionId::new("s");

        ledger.record_completed(&session, &ItemId::new("a")).await;
        ledger.save(&session, &[ItemId::new("a")]).await;
        ledger.delete(&session).await;
        assert!(ledger.load(&session).await.is_empty());
    }
}
