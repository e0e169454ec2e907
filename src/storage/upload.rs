use std::time::Duration;

use reqwest::{
    Client as HttpClient,
    header::{CACHE_CONTROL, CONTENT_TYPE},
};
use tracing::{debug, info};

use crate::{
    config::StorageConfig,
    errors::{PipelineError, Result, truncate_text},
    storage::StorageKey,
};

const ERROR_BODY_CHARS: usize = 512;

/// Object-store client for the configured bucket. Uploads overwrite.
#[derive(Debug, Clone)]
pub struct StorageUploader {
    http: HttpClient,
    timeout: Duration,
    base: String,
    bucket: String,
    service_key: String,
    cache_control: String,
}

impl StorageUploader {
    pub fn new(http: HttpClient, config: &StorageConfig, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            base: config.storage_base(),
            bucket: config.bucket.clone(),
            service_key: config.service_key.clone(),
            cache_control: config.cache_control.clone(),
        }
    }

    pub fn object_url(&self, key: &StorageKey) -> String {
        format!("{}/object/{}/{}", self.base, self.bucket, key)
    }

    pub fn public_url(&self, key: &StorageKey) -> String {
        format!("{}/object/public/{}/{}", self.base, self.bucket, key)
    }

    pub async fn upload(&self, data: Vec<u8>, key: &StorageKey, content_type: &str) -> Result<String> {
        let endpoint = self.object_url(key);
        let size = data.len();
        debug!(target: "storage", %endpoint, size, content_type, "uploading object");

        let response = self
            .http
            .put(&endpoint)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, &self.cache_control)
            .header("x-upsert", "true")
            .timeout(self.timeout)
            .body(data)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PipelineError::Timeout {
                        operation: "storage upload",
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    PipelineError::Reqwest(err)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upload {
                status: status.as_u16(),
                body: truncate_text(&body, ERROR_BODY_CHARS),
            });
        }

        let url = self.public_url(key);
        info!(target: "storage", %url, size, "object stored");
        Ok(url)
    }
}
