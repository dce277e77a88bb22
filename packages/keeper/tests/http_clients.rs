//! The JSON-RPC contract client and the storage client against local HTTP
//! servers that mimic a Hardhat node and the storage API.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, head, post},
    Json, Router,
};
use num_bigint::BigUint;
use serde_json::{json, Value};

use ethernauts_keeper::{
    chain::{abi, EthernautsClient, EthernautsContract},
    storage::{FleekClient, PinningService},
};

const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
const NODE_ACCOUNT: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ---------------------------------------------------------------------------
// Hardhat node stand-in
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Node {
    calls: Mutex<Vec<(String, Value)>>,
    receipt_polls: Mutex<u32>,
    receipt_status: &'static str,
    fail_calls: bool,
}

async fn rpc(State(node): State<Arc<Node>>, Json(req): Json<Value>) -> Json<Value> {
    let method = req["method"].as_str().unwrap_or_default().to_string();
    node.calls
        .lock()
        .unwrap()
        .push((method.clone(), req["params"].clone()));

    let result = match method.as_str() {
        "eth_call" if node.fail_calls => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": -32000, "message": "execution reverted: batch not revealed"}
            }))
        }
        "eth_call" => json!(format!("0x{:064x}", 1234u64)),
        "eth_accounts" => json!([NODE_ACCOUNT]),
        "eth_sendTransaction" => json!("0xfeed"),
        "eth_getTransactionReceipt" => {
            let mut polls = node.receipt_polls.lock().unwrap();
            *polls += 1;
            if *polls < 3 {
                Value::Null
            } else {
                json!({"blockNumber": "0x5", "status": node.receipt_status})
            }
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": {"code": -32601, "message": "method not found"}
            }))
        }
    };

    Json(json!({"jsonrpc": "2.0", "id": req["id"], "result": result}))
}

async fn node(node: Node) -> (Arc<Node>, EthernautsClient) {
    let node = Arc::new(node);
    let url = spawn(Router::new().route("/", post(rpc)).with_state(node.clone())).await;
    let client = EthernautsClient::new(url, CONTRACT.to_string())
        .with_poll_interval(Duration::from_millis(10));
    (node, client)
}

#[tokio::test]
async fn reads_random_number_for_batch() {
    let (node, client) = node(Node::default()).await;

    let random = client.get_random_number_for_batch(3).await.unwrap();
    assert_eq!(random, BigUint::from(1234u32));

    let calls = node.calls.lock().unwrap();
    let (method, params) = &calls[0];
    assert_eq!(method, "eth_call");
    assert_eq!(params[0]["to"], CONTRACT);
    let expected = abi::calldata("getRandomNumberForBatch(uint256)", &abi::encode_uint256(3));
    assert_eq!(params[0]["data"], expected);
    assert_eq!(params[1], "latest");
}

#[tokio::test]
async fn rpc_errors_propagate() {
    let (_node, client) = node(Node {
        fail_calls: true,
        ..Default::default()
    })
    .await;

    let err = client.get_random_number_for_batch(0).await.unwrap_err();
    assert!(format!("{:#}", err).contains("batch not revealed"));
}

#[tokio::test]
async fn sets_base_uri_from_first_node_account_and_waits_for_receipt() {
    let (node, client) = node(Node {
        receipt_status: "0x1",
        ..Default::default()
    })
    .await;

    let tx_hash = client.set_base_uri("ipfs://bafy/").await.unwrap();
    assert_eq!(tx_hash, "0xfeed");
    let receipt = client.wait_for_receipt(&tx_hash).await.unwrap();
    assert_eq!(receipt.block_number, 5);
    assert_eq!(*node.receipt_polls.lock().unwrap(), 3);

    let calls = node.calls.lock().unwrap();
    let (_, params) = calls
        .iter()
        .find(|(m, _)| m == "eth_sendTransaction")
        .unwrap();
    assert_eq!(params[0]["from"], NODE_ACCOUNT);
    let data = params[0]["data"].as_str().unwrap();
    assert!(data.starts_with(&format!("0x{}", hex::encode(abi::selector("setBaseURI(string)")))));
}

#[tokio::test]
async fn configured_sender_skips_account_lookup() {
    let (node, client) = node(Node::default()).await;
    let client = client.with_from(Some("0x70997970c51812dc3a010c7d01b50e0d17dc79c8".into()));

    client.set_base_uri("ipfs://bafy/").await.unwrap();

    let calls = node.calls.lock().unwrap();
    assert!(calls.iter().all(|(m, _)| m != "eth_accounts"));
}

#[tokio::test]
async fn reverted_transaction_is_reported() {
    let (_node, client) = node(Node {
        receipt_status: "0x0",
        ..Default::default()
    })
    .await;

    let err = client.wait_for_receipt("0xfeed").await.unwrap_err();
    assert!(err.to_string().contains("reverted"));
}

// ---------------------------------------------------------------------------
// Storage API stand-in
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Bucket {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-api-key").is_some_and(|v| v == "key")
        && headers.get("x-api-secret").is_some_and(|v| v == "secret")
}

async fn folder(
    headers: HeaderMap,
    Path((_bucket, folder)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(json!({"hash": format!("bafy-{}", folder)})))
}

async fn exists(
    State(bucket): State<Arc<Bucket>>,
    headers: HeaderMap,
    Path((_bucket, key)): Path<(String, String)>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if bucket.objects.lock().unwrap().contains_key(&key) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn upload(
    State(bucket): State<Arc<Bucket>>,
    headers: HeaderMap,
    Path((_bucket, key)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    bucket.objects.lock().unwrap().insert(key.clone(), body.to_vec());
    Ok(Json(json!({
        "key": key,
        "hash": format!("bafy{}", body.len()),
        "publicUrl": format!("https://storage.example/{}", key)
    })))
}

async fn bucket() -> (Arc<Bucket>, String) {
    let bucket = Arc::new(Bucket::default());
    let app = Router::new()
        .route("/buckets/{bucket}/folders/{*folder}", get(folder))
        .route("/buckets/{bucket}/objects/{*key}", head(exists).put(upload))
        .with_state(bucket.clone());
    (bucket, spawn(app).await)
}

#[tokio::test]
async fn storage_round_trip() {
    let (bucket, url) = bucket().await;
    let client = FleekClient::new(&url, "ethernauts".into(), "key".into(), "secret".into());

    assert!(!client.file_exists("metadata/1").await.unwrap());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("1.json");
    std::fs::write(&path, r#"{"name":"EthernautDAO #1"}"#).unwrap();

    let result = client.upload_file("metadata/1", &path).await.unwrap();
    assert_eq!(result.key, "metadata/1");
    assert_eq!(result.public_url.as_deref(), Some("https://storage.example/metadata/1"));
    assert!(client.file_exists("metadata/1").await.unwrap());
    assert_eq!(
        bucket.objects.lock().unwrap()["metadata/1"],
        br#"{"name":"EthernautDAO #1"}"#.to_vec()
    );

    assert_eq!(client.get_folder_hash("metadata").await.unwrap(), "bafy-metadata");
}

#[tokio::test]
async fn bad_credentials_are_errors_not_absence() {
    let (_bucket, url) = bucket().await;
    let client = FleekClient::new(&url, "ethernauts".into(), "key".into(), "wrong".into());

    assert!(client.file_exists("metadata/1").await.is_err());
    assert!(client.get_folder_hash("metadata").await.is_err());
}

#[tokio::test]
async fn uploading_a_missing_file_fails_before_any_request() {
    let (bucket, url) = bucket().await;
    let client = FleekClient::new(&url, "ethernauts".into(), "key".into(), "secret".into());

    let err = client
        .upload_file("assets/1.png", std::path::Path::new("/no/such/1.png"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("failed reading"));
    assert!(bucket.objects.lock().unwrap().is_empty());
}
