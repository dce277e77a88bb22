//! Pin one token's metadata and image.
//!
//! Tokens whose metadata object already exists remotely are skipped.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobContext, JobSettings};
use crate::storage::UploadResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResourceData {
    pub token_id: u64,
    pub asset_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedResource {
    pub token_id: u64,
    pub asset_id: u64,
    pub metadata: UploadResult,
    pub asset: UploadResult,
}

pub async fn upload_resource(
    data: UploadResourceData,
    ctx: &JobContext,
) -> Result<Option<UploadedResource>> {
    let UploadResourceData { token_id, asset_id } = data;
    let settings = &ctx.settings;

    let metadata_key = format!("{}/{}", settings.fleek_metadata_folder, token_id);
    let asset_key = format!("{}/{}.png", settings.fleek_assets_folder, token_id);

    if ctx.storage.file_exists(&metadata_key).await? {
        tracing::warn!(token_id, key = %metadata_key, "resource already uploaded");
        return Ok(None);
    }

    let metadata_path = settings
        .resources_metadata_folder
        .join(format!("{}.json", asset_id));
    let asset_path = settings
        .resources_assets_folder
        .join(format!("{}.png", asset_id));

    stamp_metadata(&metadata_path, token_id, settings).await?;

    let (metadata, asset) = tokio::try_join!(
        ctx.storage.upload_file(&metadata_key, &metadata_path),
        ctx.storage.upload_file(&asset_key, &asset_path),
    )?;

    Ok(Some(UploadedResource {
        token_id,
        asset_id,
        metadata,
        asset,
    }))
}

/// Write the token's name and external link into the asset's metadata file.
async fn stamp_metadata(path: &Path, token_id: u64, settings: &JobSettings) -> Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed reading {}", path.display()))?;
    let mut data: Value = serde_json::from_slice(&raw)
        .with_context(|| format!("invalid metadata JSON in {}", path.display()))?;

    let fields = data
        .as_object_mut()
        .with_context(|| format!("metadata in {} is not a JSON object", path.display()))?;
    fields.insert(
        "name".to_string(),
        Value::String(format!("{}{}", settings.token_name_prefix, token_id)),
    );
    fields.insert(
        "external_url".to_string(),
        Value::String(format!("{}{}", settings.external_url_base, token_id)),
    );

    let contents = serde_json::to_string_pretty(&data).context("failed to serialize metadata")?;
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(())
}
