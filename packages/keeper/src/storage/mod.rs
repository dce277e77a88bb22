//! Remote IPFS pinning storage.

pub mod fleek;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fleek::FleekClient;

/// What the pinning service reports for a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub key: String,
    /// IPFS content hash.
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
}

#[async_trait]
pub trait PinningService: Send + Sync {
    /// Content hash of a folder (the directory CID).
    async fn get_folder_hash(&self, folder: &str) -> Result<String>;

    async fn file_exists(&self, key: &str) -> Result<bool>;

    /// Upload the local file at `location` under `key`.
    async fn upload_file(&self, key: &str, location: &Path) -> Result<UploadResult>;
}
