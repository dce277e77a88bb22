//! Keeper configuration: command-line flags with environment fallbacks.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use crate::jobs::JobSettings;

/// Hardhat networks the contract is deployed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Network {
    /// Node on the host machine.
    Local,
    /// Node inside the docker-compose network.
    Docker,
}

impl Network {
    pub fn rpc_url(self) -> &'static str {
        match self {
            Network::Local => "http://localhost:8545",
            Network::Docker => "http://hardhat-node:8545",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct KeeperConfig {
    /// Named Hardhat network. Ignored when --rpc-url is given.
    #[arg(long, value_enum, env = "NETWORK", default_value = "local")]
    pub network: Network,

    /// Ethereum JSON-RPC URL.
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Ethernauts contract address.
    #[arg(long, env = "ETHERNAUTS_ADDRESS")]
    pub contract_address: String,

    /// Account that sends setBaseURI. Defaults to the node's first account.
    #[arg(long, env = "KEEPER_ACCOUNT")]
    pub from: Option<String>,

    /// Interval between transaction receipt polls, in milliseconds.
    #[arg(long, default_value = "1000")]
    pub receipt_poll_ms: u64,

    /// Storage API base URL.
    #[arg(long, env = "FLEEK_ENDPOINT", default_value = "https://storageapi.fleek.co")]
    pub fleek_endpoint: String,

    #[arg(long, env = "FLEEK_API_KEY")]
    pub fleek_api_key: String,

    #[arg(long, env = "FLEEK_API_SECRET")]
    pub fleek_api_secret: String,

    #[arg(long, env = "FLEEK_BUCKET", default_value = "ethernauts-bucket")]
    pub fleek_bucket: String,

    #[arg(long, env = "FLEEK_METADATA_FOLDER", default_value = "metadata")]
    pub fleek_metadata_folder: String,

    #[arg(long, env = "FLEEK_ASSETS_FOLDER", default_value = "assets")]
    pub fleek_assets_folder: String,

    /// Local directory with `<assetId>.json` metadata files.
    #[arg(long, env = "RESOURCES_METADATA_FOLDER", default_value = "resources/metadata")]
    pub resources_metadata_folder: PathBuf,

    /// Local directory with `<assetId>.png` images.
    #[arg(long, env = "RESOURCES_ASSETS_FOLDER", default_value = "resources/assets")]
    pub resources_assets_folder: PathBuf,

    #[arg(long, env = "MINTS_QUEUE_NAME", default_value = "mints")]
    pub mints_queue_name: String,
}

impl KeeperConfig {
    pub fn rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.network.rpc_url().to_string())
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    /// Build handler settings. Resource folders that exist are made absolute;
    /// missing ones are kept as given and only fail the jobs that read them.
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            mints_queue_name: self.mints_queue_name.clone(),
            fleek_metadata_folder: self.fleek_metadata_folder.clone(),
            fleek_assets_folder: self.fleek_assets_folder.clone(),
            resources_metadata_folder: absolute(&self.resources_metadata_folder),
            resources_assets_folder: absolute(&self.resources_assets_folder),
            ..JobSettings::default()
        }
    }

    /// Fail early when a resource folder is missing. Only uploads need them.
    pub fn require_resource_folders(&self) -> Result<()> {
        for (kind, folder) in [
            ("metadata", &self.resources_metadata_folder),
            ("assets", &self.resources_assets_folder),
        ] {
            if !folder.is_dir() {
                bail!("{} folder not found: {}", kind, folder.display());
            }
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
