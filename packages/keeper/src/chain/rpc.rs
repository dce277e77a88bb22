//! Ethereum JSON-RPC transport used by the contract client.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request wrapper.
#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response wrapper.
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

/// Perform a raw JSON-RPC call where a `null` result is meaningful
/// (e.g. `eth_getTransactionReceipt` for a pending transaction).
pub async fn rpc_call_opt(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<Option<Value>> {
    let req = RpcRequest {
        jsonrpc: "2.0",
        id: 1,
        method,
        params,
    };

    let resp: RpcResponse = client
        .post(url)
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

    Ok(resp.result.filter(|v| !v.is_null()))
}

/// Perform a raw JSON-RPC call that must produce a result.
pub async fn rpc_call(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
) -> Result<Value> {
    rpc_call_opt(client, url, method, params)
        .await?
        .ok_or_else(|| anyhow::anyhow!("RPC response has no result for {}", method))
}

/// `eth_accounts`: accounts unlocked on the node.
pub async fn eth_accounts(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    let result = rpc_call(client, url, "eth_accounts", serde_json::json!([])).await?;
    serde_json::from_value(result).context("eth_accounts: expected array of addresses")
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

fn strip_hex_prefix(hex_str: &str) -> &str {
    hex_str
        .strip_prefix("0x")
        .or_else(|| hex_str.strip_prefix("0X"))
        .unwrap_or(hex_str)
}

pub fn parse_hex_bytes(hex_str: &str) -> Result<Vec<u8>> {
    let stripped = strip_hex_prefix(hex_str);

    if stripped.is_empty() {
        return Ok(Vec::new());
    }

    // Handle odd-length hex
    let padded = if stripped.len() % 2 == 1 {
        format!("0{}", stripped)
    } else {
        stripped.to_string()
    };

    hex::decode(&padded).context("invalid hex string")
}

pub fn parse_hex_u64(hex_str: &str) -> Result<u64> {
    u64::from_str_radix(strip_hex_prefix(hex_str), 16).context("invalid hex u64")
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    use tiny_keccak::{Hasher, Keccak};
    let mut keccak = Keccak::v256();
    keccak.update(data);
    let mut out = [0u8; 32];
    keccak.finalize(&mut out);
    out
}
