//! Calls into the Ethernauts NFT contract.
//!
//! Reads `getRandomNumberForBatch(uint256)` for batch shuffling and sends
//! `setBaseURI(string)` once a batch of metadata has been pinned.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::Value;

use super::{abi, rpc};

const GET_RANDOM_NUMBER_FOR_BATCH: &str = "getRandomNumberForBatch(uint256)";
const SET_BASE_URI: &str = "setBaseURI(string)";

/// Default interval between `eth_getTransactionReceipt` polls.
pub const DEFAULT_RECEIPT_POLL: Duration = Duration::from_secs(1);

/// A mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// The contract operations jobs depend on.
#[async_trait]
pub trait EthernautsContract: Send + Sync {
    /// Deterministic on-chain random value assigned to `batch_number`.
    async fn get_random_number_for_batch(&self, batch_number: u64) -> Result<BigUint>;

    /// Submit `setBaseURI(uri)` and return the transaction hash.
    async fn set_base_uri(&self, uri: &str) -> Result<String>;

    /// Block until `tx_hash` is mined. A reverted transaction is an error.
    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt>;
}

/// JSON-RPC backed client for the Ethernauts contract.
pub struct EthernautsClient {
    http: reqwest::Client,
    rpc_url: String,
    address: String,
    /// Sending account. Falls back to the node's first unlocked account.
    from: Option<String>,
    poll_interval: Duration,
}

impl EthernautsClient {
    pub fn new(rpc_url: String, address: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
            address,
            from: None,
            poll_interval: DEFAULT_RECEIPT_POLL,
        }
    }

    pub fn with_from(mut self, from: Option<String>) -> Self {
        self.from = from;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn sender(&self) -> Result<String> {
        if let Some(ref from) = self.from {
            return Ok(from.clone());
        }
        rpc::eth_accounts(&self.http, &self.rpc_url)
            .await?
            .into_iter()
            .next()
            .context("node exposes no unlocked accounts; configure a sending account")
    }

    /// Perform an `eth_call` (read-only contract call).
    async fn eth_call(&self, data: &str) -> Result<String> {
        let result = rpc::rpc_call(
            &self.http,
            &self.rpc_url,
            "eth_call",
            serde_json::json!([{"to": self.address, "data": data}, "latest"]),
        )
        .await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .context("eth_call: expected hex string result")
    }
}

#[async_trait]
impl EthernautsContract for EthernautsClient {
    async fn get_random_number_for_batch(&self, batch_number: u64) -> Result<BigUint> {
        let data = abi::calldata(GET_RANDOM_NUMBER_FOR_BATCH, &abi::encode_uint256(batch_number));
        let result = self
            .eth_call(&data)
            .await
            .context("getRandomNumberForBatch call failed")?;

        abi::decode_uint256(&rpc::parse_hex_bytes(&result)?)
    }

    async fn set_base_uri(&self, uri: &str) -> Result<String> {
        let from = self.sender().await?;
        let data = abi::calldata(SET_BASE_URI, &abi::encode_string(uri));

        let result = rpc::rpc_call(
            &self.http,
            &self.rpc_url,
            "eth_sendTransaction",
            serde_json::json!([{"from": from, "to": self.address, "data": data}]),
        )
        .await
        .context("setBaseURI transaction failed")?;

        let tx_hash = result
            .as_str()
            .context("eth_sendTransaction: expected transaction hash")?
            .to_string();

        tracing::info!(tx_hash = %tx_hash, uri = %uri, "setBaseURI submitted");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<TxReceipt> {
        loop {
            let receipt = rpc::rpc_call_opt(
                &self.http,
                &self.rpc_url,
                "eth_getTransactionReceipt",
                serde_json::json!([tx_hash]),
            )
            .await?;

            if let Some(receipt) = receipt {
                return parse_receipt(tx_hash, &receipt);
            }

            tracing::debug!(tx_hash = %tx_hash, "transaction pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn parse_receipt(tx_hash: &str, receipt: &Value) -> Result<TxReceipt> {
    let block_number = rpc::parse_hex_u64(
        receipt
            .get("blockNumber")
            .and_then(|v| v.as_str())
            .context("receipt missing blockNumber")?,
    )?;

    // Pre-Byzantium receipts have no status; treat them as successful.
    if let Some(status) = receipt.get("status").and_then(|v| v.as_str()) {
        if rpc::parse_hex_u64(status)? == 0 {
            bail!("transaction {} reverted in block {}", tx_hash, block_number);
        }
    }

    Ok(TxReceipt {
        transaction_hash: tx_hash.to_string(),
        block_number,
    })
}
