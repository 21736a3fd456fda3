//! 开发用配置文件（config.toml）

use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use crate::core::{SchedulerConfig, DEFAULT_CONCURRENCY};
use crate::uploaders::StorageConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub storage: StorageSection,
    #[serde(default)]
    pub upload: UploadSection,
    pub metadata: Option<MetadataSection>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct StorageSection {
    pub base_url: String,
    pub bucket: String,
    #[serde(default)]
    pub token: String,
    /// 单个请求超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct UploadSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_collection")]
    pub collection_id: String,
    pub uploaded_by: Option<String>,
    /// 断点记录目录，缺省时只保存在内存中
    pub ledger_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MetadataSection {
    pub base_url: String,
    pub table: String,
}

fn default_timeout_secs() -> u64 {
    crate::uploaders::DEFAULT_TIMEOUT.as_secs()
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_collection() -> String {
    "default".to_string()
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            collection_id: default_collection(),
            uploaded_by: None,
            ledger_dir: None,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            base_url: self.storage.base_url.clone(),
            bucket: self.storage.bucket.clone(),
            timeout: Duration::from_secs(self.storage.timeout_secs),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.upload.concurrency,
            collection_id: self.upload.collection_id.clone(),
            uploaded_by: self.upload.uploaded_by.clone(),
            session_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            base_url = "https://store.example.com"
            bucket = "documents"
            token = "abc"
            timeout_secs = 60

            [upload]
            concurrency = 5
            collection_id = "client-42"
            uploaded_by = "user-1"
            ledger_dir = "/tmp/courier"

            [metadata]
            base_url = "https://store.example.com"
            table = "documents"
            "#,
        )
        .unwrap();

        assert!(config.storage.base_url.starts_with("http"));
        assert_eq!(config.storage_config().timeout, Duration::from_secs(60));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.concurrency, 5);
        assert_eq!(scheduler.collection_id, "client-42");
        assert_eq!(scheduler.uploaded_by.as_deref(), Some("user-1"));
        assert_eq!(config.metadata.unwrap().table, "documents");
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            base_url = "http://localhost:54321"
            bucket = "files"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.timeout_secs, 300);
        assert!(config.storage.token.is_empty());
        assert_eq!(config.upload.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.upload.ledger_dir.is_none());
        assert!(config.metadata.is_none());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(Config::from_toml_str("[storage"), Err(ConfigError::Parse(_))));
    }
}
