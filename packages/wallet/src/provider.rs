//! Ethereum providers.
//!
//! A raw [`Eip1193Provider`] is whatever the wallet hands back on connect: it
//! answers JSON-RPC requests and may emit account, chain and disconnect
//! events. [`Web3Provider`] wraps one with the typed calls the session needs.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Events a wallet emits while connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// New account list; the first entry is the active account.
    AccountsChanged(Vec<String>),
    /// Hex chain id of the newly selected network.
    ChainChanged(String),
    /// The wallet dropped the connection.
    Disconnect(Option<String>),
}

#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Send a JSON-RPC request. A `null` result is returned as `Value::Null`.
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Subscribe to provider events, if this provider emits any.
    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>>;

    fn is_closable(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Which network a [`Web3Provider`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Follow whatever chain the wallet is on.
    Any,
    /// Refuse to operate on any other chain.
    Chain(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub chain_id: u64,
}

/// Typed view over a raw provider.
#[derive(Clone)]
pub struct Web3Provider {
    inner: Arc<dyn Eip1193Provider>,
    network: Network,
}

impl Web3Provider {
    pub fn new(inner: Arc<dyn Eip1193Provider>, network: Network) -> Self {
        Self { inner, network }
    }

    /// Signer for the wallet's first account.
    pub fn get_signer(&self) -> Signer {
        Signer {
            provider: self.clone(),
            index: 0,
        }
    }

    /// Balance in wei.
    pub async fn get_balance(&self, address: &str) -> Result<u128> {
        let result = self
            .inner
            .request("eth_getBalance", serde_json::json!([address, "latest"]))
            .await
            .context("eth_getBalance failed")?;
        let hex_balance = result
            .as_str()
            .context("eth_getBalance: expected hex string")?;
        parse_hex_u128(hex_balance).context("invalid balance hex")
    }

    pub async fn get_network(&self) -> Result<NetworkInfo> {
        let result = self
            .inner
            .request("eth_chainId", serde_json::json!([]))
            .await
            .context("eth_chainId failed")?;
        let chain_id = parse_hex_u128(result.as_str().context("eth_chainId: expected string")?)?;
        let chain_id = u64::try_from(chain_id).context("chain id does not fit in u64")?;

        if let Network::Chain(expected) = self.network {
            if expected != chain_id {
                bail!(
                    "underlying network changed: expected {} but wallet is on {}",
                    expected,
                    chain_id
                );
            }
        }
        Ok(NetworkInfo { chain_id })
    }

    pub fn is_closable(&self) -> bool {
        self.inner.is_closable()
    }

    pub async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// An account of the connected wallet.
#[derive(Clone)]
pub struct Signer {
    provider: Web3Provider,
    index: usize,
}

impl Signer {
    pub async fn get_address(&self) -> Result<String> {
        let result = self
            .provider
            .inner
            .request("eth_accounts", serde_json::json!([]))
            .await
            .context("eth_accounts failed")?;
        let accounts: Vec<String> =
            serde_json::from_value(result).context("eth_accounts: expected array of addresses")?;
        accounts
            .into_iter()
            .nth(self.index)
            .with_context(|| format!("unknown account #{}", self.index))
    }
}

// ---------------------------------------------------------------------------
// HTTP JSON-RPC provider
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Raw provider backed by a JSON-RPC HTTP endpoint.
///
/// HTTP carries no wallet events; the embedding host forwards them with
/// [`HttpProvider::emit`].
pub struct HttpProvider {
    http: reqwest::Client,
    url: String,
    events: broadcast::Sender<ProviderEvent>,
}

impl HttpProvider {
    pub fn new(url: String) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            http: reqwest::Client::new(),
            url,
            events,
        }
    }

    /// Deliver an event to every subscriber. Returns how many received it.
    pub fn emit(&self, event: ProviderEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }
}

#[async_trait]
impl Eip1193Provider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let resp: RpcResponse = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .with_context(|| format!("RPC request to {} failed", method))?
            .json()
            .await
            .with_context(|| format!("failed to parse RPC response for {}", method))?;

        if let Some(err) = resp.error {
            bail!("RPC error ({}): {}", err.code, err.message);
        }

        Ok(resp.result.unwrap_or(Value::Null))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.events.subscribe())
    }
}

fn parse_hex_u128(hex_str: &str) -> Result<u128> {
    let stripped = hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str);
    u128::from_str_radix(stripped, 16).context("invalid hex quantity")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Scripted {
        responses: HashMap<&'static str, Value>,
    }

    #[async_trait]
    impl Eip1193Provider for Scripted {
        async fn request(&self, method: &str, _params: Value) -> Result<Value> {
            self.responses
                .get(method)
                .cloned()
                .with_context(|| format!("unexpected method {}", method))
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
            None
        }
    }

    fn provider(network: Network) -> Web3Provider {
        let responses = HashMap::from([
            ("eth_accounts", serde_json::json!(["0xabc", "0xdef"])),
            ("eth_getBalance", serde_json::json!("0xde0b6b3a7640000")),
            ("eth_chainId", serde_json::json!("0xa")),
        ]);
        Web3Provider::new(Arc::new(Scripted { responses }), network)
    }

    #[tokio::test]
    async fn reads_balance_in_wei() {
        let balance = provider(Network::Any).get_balance("0xabc").await.unwrap();
        assert_eq!(balance, 1_000_000_000_000_000_000);
    }

    #[tokio::test]
    async fn signer_uses_first_account() {
        let signer = provider(Network::Any).get_signer();
        assert_eq!(signer.get_address().await.unwrap(), "0xabc");
    }

    #[tokio::test]
    async fn any_network_accepts_every_chain() {
        let info = provider(Network::Any).get_network().await.unwrap();
        assert_eq!(info.chain_id, 10);
    }

    #[tokio::test]
    async fn pinned_network_rejects_other_chains() {
        assert!(provider(Network::Chain(10)).get_network().await.is_ok());
        let err = provider(Network::Chain(69)).get_network().await.unwrap_err();
        assert!(err.to_string().contains("network changed"));
    }

    #[test]
    fn hex_quantities() {
        assert_eq!(parse_hex_u128("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u128("0X1f").unwrap(), 31);
        assert!(parse_hex_u128("0xnope").is_err());
    }

    #[test]
    fn emitting_without_subscribers_reaches_nobody() {
        let provider = HttpProvider::new("http://localhost:8545".into());
        assert_eq!(provider.emit(ProviderEvent::ChainChanged("0x1".into())), 0);
        let _rx = provider.subscribe().unwrap();
        assert_eq!(provider.emit(ProviderEvent::ChainChanged("0x1".into())), 1);
    }
}
