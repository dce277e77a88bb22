//! HTTP client for the Fleek storage bucket that backs the collection.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{PinningService, UploadResult};

const API_KEY_HEADER: &str = "x-api-key";
const API_SECRET_HEADER: &str = "x-api-secret";

#[derive(Deserialize)]
struct FolderResponse {
    hash: String,
}

pub struct FleekClient {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
    api_key: String,
    api_secret: String,
}

impl FleekClient {
    pub fn new(endpoint: &str, bucket: String, api_key: String, api_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket,
            api_key,
            api_secret,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/buckets/{}/objects/{}",
            self.endpoint,
            self.bucket,
            key.trim_start_matches('/')
        )
    }

    fn folder_url(&self, folder: &str) -> String {
        format!(
            "{}/buckets/{}/folders/{}",
            self.endpoint,
            self.bucket,
            folder.trim_matches('/')
        )
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header(API_KEY_HEADER, &self.api_key)
            .header(API_SECRET_HEADER, &self.api_secret)
    }
}

#[async_trait]
impl PinningService for FleekClient {
    async fn get_folder_hash(&self, folder: &str) -> Result<String> {
        let resp: FolderResponse = self
            .authorized(self.http.get(self.folder_url(folder)))
            .send()
            .await
            .with_context(|| format!("folder lookup for {} failed", folder))?
            .error_for_status()
            .with_context(|| format!("folder lookup for {} rejected", folder))?
            .json()
            .await
            .context("failed to parse folder response")?;

        if resp.hash.is_empty() {
            bail!("storage returned an empty hash for folder {}", folder);
        }
        Ok(resp.hash)
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let resp = self
            .authorized(self.http.head(self.object_url(key)))
            .send()
            .await
            .with_context(|| format!("existence check for {} failed", key))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => bail!("existence check for {} returned {}", key, status),
        }
    }

    async fn upload_file(&self, key: &str, location: &Path) -> Result<UploadResult> {
        let body = tokio::fs::read(location)
            .await
            .with_context(|| format!("failed reading {}", location.display()))?;

        tracing::debug!(key = %key, bytes = body.len(), "uploading object");

        let result: UploadResult = self
            .authorized(self.http.put(self.object_url(key)))
            .body(body)
            .send()
            .await
            .with_context(|| format!("upload of {} failed", key))?
            .error_for_status()
            .with_context(|| format!("upload of {} rejected", key))?
            .json()
            .await
            .with_context(|| format!("failed to parse upload response for {}", key))?;

        Ok(result)
    }
}
