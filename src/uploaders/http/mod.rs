mod metadata;

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Client};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use url::Url;
use crate::core::{FileSource, ProgressFn, StoredObject, TokenProvider, TransferError, TransferRequest, Uploader};
use super::progress_stream::ProgressStream;

pub use metadata::HttpMetadataStore;

/// 默认请求超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// 内存数据的分片大小
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// 服务地址，例如 `https://project.example.com`
    pub base_url: String,
    pub bucket: String,
    pub timeout: Duration,
}

impl StorageConfig {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bucket: bucket.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// 对象存储 HTTP 上传器
///
/// 每个文件一次 POST，请求体以流的方式发送并报告进度。
pub struct HttpUploader {
    client: Client,
    base_url: Url,
    bucket: String,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpUploader {
    pub fn new(config: StorageConfig, tokens: Arc<dyn TokenProvider>) -> Result<Self, TransferError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|err| TransferError::InvalidDestination(format!("{}: {}", config.base_url, err)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransferError::InvalidDestination(config.base_url));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            bucket: config.bucket,
            tokens,
        })
    }

    /// 上传地址 `{base}/storage/v1/object/{bucket}/{key}`
    pub fn object_url(&self, key: &str) -> Result<Url, TransferError> {
        self.endpoint(&["storage", "v1", "object"], key)
    }

    /// 公开访问地址 `{base}/storage/v1/object/public/{bucket}/{key}`
    pub fn public_url(&self, key: &str) -> Result<Url, TransferError> {
        self.endpoint(&["storage", "v1", "object", "public"], key)
    }

    fn endpoint(&self, prefix: &[&str], key: &str) -> Result<Url, TransferError> {
        if key.is_empty() || key.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(TransferError::InvalidDestination(key.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransferError::InvalidDestination(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(prefix)
            .push(&self.bucket)
            .extend(key.split('/'));
        Ok(url)
    }

    async fn body(&self, source: &FileSource, progress: ProgressFn) -> Result<Body, TransferError> {
        let body = match source {
            FileSource::Path(path) => {
                let file = File::open(path).await?;
                Body::wrap_stream(ProgressStream::new(file_stream(file), progress))
            }
            FileSource::Bytes(data) => {
                let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
                    .step_by(STREAM_CHUNK_SIZE)
                    .map(|start| Ok(data.slice(start..data.len().min(start + STREAM_CHUNK_SIZE))))
                    .collect();
                Body::wrap_stream(ProgressStream::new(futures::stream::iter(chunks), progress))
            }
        };
        Ok(body)
    }
}

/// 按 `STREAM_CHUNK_SIZE` 读取文件，每个分片触发一次进度回调
fn file_stream(file: File) -> ReaderStream<File> {
    ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE)
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn transfer(
        &self,
        request: TransferRequest<'_>,
        progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<StoredObject, TransferError> {
        let token = self
            .tokens
            .access_token()
            .await
            .ok_or(TransferError::NotAuthenticated)?;

        let url = self.object_url(request.key)?;
        let public_url = self.public_url(request.key)?;
        let body = self.body(request.source, progress.clone()).await?;

        let send = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("x-upsert", "true")
            .header(CONTENT_TYPE, request.content_type.unwrap_or("application/octet-stream"))
            .header(CONTENT_LENGTH, request.size)
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message = if message.is_empty() {
                format!("Upload failed with status {}", status)
            } else {
                message
            };
            return Err(TransferError::server_error(status.as_u16(), message));
        }

        progress(request.size);
        tracing::debug!(key = request.key, size = request.size, "object stored");

        Ok(StoredObject {
            storage_key: request.key.to_string(),
            url: public_url.to_string(),
        })
    }
}
