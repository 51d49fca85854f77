//! HTTP client for a remote registry

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Response;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::wire::{ErrorBody, ExistsResponse, ListResponse, RecordResponse, UploadRequest, UploadResponse};
use crate::error::{ErrorKind, Result, SchemaError};
use crate::schema::{RecordMetadata, SchemaRecord};
use crate::source::SchemaSource;
use crate::version::{SchemaTarget, SchemaVersion};

/// Client for the registry HTTP API
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl RegistryClient {
    /// Create a client; a base URL without a scheme is treated as `http://`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("familiar-isr/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn upload(&self, version: &str, payload: &[u8]) -> Result<RecordMetadata> {
        let response = self
            .http_client
            .post(self.url("/v1/schemas"))
            .json(&UploadRequest::new(version, payload))
            .send()
            .await?;
        let created: UploadResponse = decode(response).await?;
        Ok(created.metadata)
    }

    pub async fn get_by_version(&self, version: &str) -> Result<SchemaRecord> {
        let version = SchemaVersion::parse(version)?;
        let response = self
            .http_client
            .get(self.url(&format!("/v1/schemas/{}", version)))
            .send()
            .await?;
        decode::<RecordResponse>(response).await?.into_record()
    }

    pub async fn latest_patch(&self, major: i32, minor: i32) -> Result<SchemaRecord> {
        let response = self
            .http_client
            .get(self.url("/v1/latest-patch"))
            .query(&[("major", major), ("minor", minor)])
            .send()
            .await?;
        let record = decode::<RecordResponse>(response).await?.into_record()?;
        debug!(major, minor, version = %record.version(), "Fetched latest patch");
        Ok(record)
    }

    pub async fn version_exists(&self, version: &str) -> Result<bool> {
        let version = SchemaVersion::parse(version)?;
        let response = self
            .http_client
            .get(self.url(&format!("/v1/schemas/{}/exists", version)))
            .send()
            .await?;
        Ok(decode::<ExistsResponse>(response).await?.exists)
    }

    pub async fn list(&self) -> Result<Vec<RecordMetadata>> {
        let response = self.http_client.get(self.url("/v1/schemas")).send().await?;
        Ok(decode::<ListResponse>(response).await?.schemas)
    }

    /// Succeeds if the registry answers its health check
    pub async fn health(&self) -> Result<()> {
        let response = self.http_client.get(self.url("/health")).send().await?;
        if !response.status().is_success() {
            return Err(SchemaError::Internal(format!(
                "registry health check returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SchemaSource for RegistryClient {
    async fn latest_patch(&self, target: SchemaTarget) -> Result<SchemaRecord> {
        let component = |value: u32| {
            i32::try_from(value)
                .map_err(|_| SchemaError::InvalidArgument(format!("target component {} does not fit in 32 bits", value)))
        };
        RegistryClient::latest_patch(self, component(target.major)?, component(target.minor)?).await
    }
}

/// Decode a success body, or turn an error body back into a [`SchemaError`]
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let body = response.bytes().await?;
    match serde_json::from_slice::<ErrorBody>(&body) {
        Ok(err) => Err(SchemaError::from_remote(ErrorKind::from_code(&err.code), err.message)),
        Err(_) => Err(SchemaError::Internal(format!(
            "registry returned {}: {}",
            status,
            String::from_utf8_lossy(&body)
        ))),
    }
}

fn normalize_base_url(base_url: &str) -> Result<String> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(SchemaError::InvalidArgument("registry URL is empty".to_string()));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("http://{}", trimmed))
    }
}
