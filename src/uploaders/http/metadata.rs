use std::sync::Arc;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;
use crate::core::{FileRecord, MetadataStore, PersistenceError, TokenProvider};

/// 通过 REST 接口插入文件记录：POST `{base}/rest/v1/{table}`
pub struct HttpMetadataStore {
    client: Client,
    endpoint: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpMetadataStore {
    pub fn new(base_url: &str, table: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, PersistenceError> {
        let mut endpoint = Url::parse(base_url).map_err(|err| PersistenceError::Rejected {
            status_code: 0,
            message: format!("invalid base url {}: {}", base_url, err),
        })?;
        endpoint
            .path_segments_mut()
            .map_err(|_| PersistenceError::Rejected {
                status_code: 0,
                message: format!("invalid base url {}", base_url),
            })?
            .pop_if_empty()
            .extend(["rest", "v1", table]);

        Ok(Self {
            client: Client::new(),
            endpoint,
            tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataStore for HttpMetadataStore {
    async fn insert(&self, record: &FileRecord) -> Result<(), PersistenceError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Prefer", "return=minimal")
            .json(record);
        if let Some(token) = self.tokens.access_token().await {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status_code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        tracing::debug!(path = %record.relative_path, "file record inserted");
        Ok(())
    }
}
