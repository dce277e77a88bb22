//! Status server API.
//!
//! These tests start the real router on a random port and hit the endpoints
//! with an HTTP client.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use ethernauts_keeper::{
    queue::{FlowQueue, Job, JobQueue},
    routes,
    state::AppState,
};

async fn server() -> (Arc<FlowQueue>, String) {
    let (event_tx, _) = broadcast::channel(64);
    let queue = Arc::new(FlowQueue::new(event_tx.clone()));
    let state = Arc::new(AppState {
        queue: queue.clone(),
        mints_queue_name: "mints".into(),
        event_tx,
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, routes::build_router(state)).await.unwrap();
    });
    (queue, format!("http://{}/api", addr))
}

#[tokio::test]
async fn health_reports_queue_counts() {
    let (queue, base) = server().await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["queue"], "mints");
    assert_eq!(body["jobs"]["waiting"], 0);

    let id = queue
        .add(Job::new("UPDATE_BASE_URL", "mints", Value::Null))
        .await
        .unwrap();
    queue.next_ready().await.unwrap();
    queue.fail(id, "rpc down").await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["jobs"]["failed"], 1);
}

#[tokio::test]
async fn enqueue_flow_and_inspect_it() {
    let (_queue, base) = server().await;
    let client = reqwest::Client::new();

    let flow = json!({
        "name": "UPDATE_BASE_URL",
        "queueName": "mints",
        "children": [
            {"name": "UPLOAD_RESOURCE", "queueName": "mints", "data": {"tokenId": 0, "assetId": 1}},
            {"name": "UPLOAD_RESOURCE", "queueName": "mints", "data": {"tokenId": 1, "assetId": 0}}
        ]
    });
    let resp = client
        .post(format!("{}/jobs", base))
        .json(&flow)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let id = resp.json::<Value>().await.unwrap()["id"].as_u64().unwrap();

    let parent: Value = reqwest::get(format!("{}/jobs/{}", base, id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(parent["status"], "waiting-children");
    assert_eq!(parent["children"].as_array().unwrap().len(), 2);

    let waiting: Vec<Value> = reqwest::get(format!("{}/jobs?status=waiting", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(waiting.len(), 2);
    assert!(waiting.iter().all(|j| j["name"] == "UPLOAD_RESOURCE" && j["parent"] == id));
}

#[tokio::test]
async fn rejects_jobs_nothing_can_run() {
    let (queue, base) = server().await;
    let client = reqwest::Client::new();

    for body in [
        json!({"name": "MINT_EVERYTHING", "queueName": "mints"}),
        json!({"name": "UPDATE_BASE_URL", "queueName": "reveal"}),
        json!({"name": "UPLOAD_RESOURCE", "queueName": "mints", "data": {"tokenId": "one"}}),
    ] {
        let resp = client
            .post(format!("{}/jobs", base))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let error = resp.json::<Value>().await.unwrap();
        assert!(error["error"].is_string());
    }

    assert!(queue.jobs().await.is_empty());
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let (_queue, base) = server().await;
    let resp = reqwest::get(format!("{}/jobs/99", base)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
