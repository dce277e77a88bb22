//! Wallet connectors hand out raw providers and remember the last choice.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    provider::{Eip1193Provider, HttpProvider},
    storage::KeyValueStore,
};

/// Storage key holding the id of the last connected provider.
pub const CACHED_PROVIDER_KEY: &str = "WEB3_CONNECT_CACHED_PROVIDER";

#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// Ask the wallet for a provider. Fails when the user rejects the request.
    async fn connect(&self) -> Result<Arc<dyn Eip1193Provider>>;

    fn cached_provider(&self) -> Option<String>;

    fn clear_cached_provider(&self) -> Result<()>;
}

/// Connects to a JSON-RPC node that exposes unlocked accounts.
pub struct HttpConnector {
    id: String,
    url: String,
    store: Arc<dyn KeyValueStore>,
    cache_provider: bool,
}

impl HttpConnector {
    pub fn new(url: String, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            id: "injected".to_string(),
            url,
            store,
            cache_provider: true,
        }
    }

    /// Remember successful connections so the next session reconnects on start.
    pub fn with_cache_provider(mut self, cache_provider: bool) -> Self {
        self.cache_provider = cache_provider;
        self
    }
}

#[async_trait]
impl WalletConnector for HttpConnector {
    async fn connect(&self) -> Result<Arc<dyn Eip1193Provider>> {
        let provider = HttpProvider::new(self.url.clone());
        let accounts = provider
            .request("eth_accounts", Value::Array(vec![]))
            .await
            .with_context(|| format!("failed to reach wallet at {}", self.url))?;
        if accounts.as_array().map_or(true, |a| a.is_empty()) {
            bail!("wallet at {} exposes no accounts", self.url);
        }

        if self.cache_provider {
            // Stored as a JSON string.
            let marker = serde_json::to_string(&self.id)?;
            self.store.set(CACHED_PROVIDER_KEY, &marker)?;
        }
        tracing::debug!(url = %self.url, "wallet connected");
        Ok(Arc::new(provider))
    }

    fn cached_provider(&self) -> Option<String> {
        let raw = match self.store.get(CACHED_PROVIDER_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read cached provider");
                return None;
            }
        };
        Some(serde_json::from_str::<String>(&raw).unwrap_or(raw))
    }

    fn clear_cached_provider(&self) -> Result<()> {
        self.store.remove(CACHED_PROVIDER_KEY)
    }
}
