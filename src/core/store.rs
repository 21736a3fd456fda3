use std::collections::HashMap;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use parking_lot::Mutex;
use super::errors::PersistenceError;
use super::traits::ResumeStore;
use super::types::ResumeRecord;

/// 进程内存储，重启后丢失
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, ResumeRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResumeStore for MemoryStore {
    async fn get(&self, session_id: &str) -> Result<Option<ResumeRecord>, PersistenceError> {
        Ok(self.records.lock().get(session_id).cloned())
    }

    async fn put(&self, record: &ResumeRecord) -> Result<(), PersistenceError> {
        self.records.lock().insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), PersistenceError> {
        self.records.lock().remove(session_id);
        Ok(())
    }
}

/// 每个会话一个 JSON 文件
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        let file_name: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl ResumeStore for JsonFileStore {
    async fn get(&self, session_id: &str) -> Result<Option<ResumeRecord>, PersistenceError> {
        let path = self.record_path(session_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let record: ResumeRecord = serde_json::from_str(&data)?;
        Ok(Some(record))
    }

    async fn put(&self, record: &ResumeRecord) -> Result<(), PersistenceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // 先写临时文件再 rename，避免崩溃时留下半个文件
        let path = self.record_path(&record.session_id);
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<(), PersistenceError> {
        match tokio::fs::remove_file(self.record_path(session_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
