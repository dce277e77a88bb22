//! Point the collection's base URI at the latest metadata folder.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::JobContext;

const IPFS_SCHEME: &str = "ipfs://";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseUrlUpdate {
    pub base_uri_hash: String,
}

/// `ipfs://<hash>/`, adding the scheme and trailing slash only when missing.
pub fn normalize_base_uri(hash: &str) -> String {
    let mut uri = if hash.starts_with(IPFS_SCHEME) {
        hash.to_string()
    } else {
        format!("{}{}", IPFS_SCHEME, hash)
    };
    if !uri.ends_with('/') {
        uri.push('/');
    }
    uri
}

pub async fn update_base_url(ctx: &JobContext) -> Result<BaseUrlUpdate> {
    let folder = &ctx.settings.fleek_metadata_folder;
    let hash = ctx
        .storage
        .get_folder_hash(folder)
        .await
        .with_context(|| format!("fetching hash of folder {}", folder))?;
    let base_uri_hash = normalize_base_uri(&hash);

    let tx_hash = ctx.contract.set_base_uri(&base_uri_hash).await?;
    let receipt = ctx.contract.wait_for_receipt(&tx_hash).await?;

    tracing::info!(
        base_uri = %base_uri_hash,
        tx_hash = %receipt.transaction_hash,
        block_number = receipt.block_number,
        "base URI updated"
    );

    Ok(BaseUrlUpdate { base_uri_hash })
}
