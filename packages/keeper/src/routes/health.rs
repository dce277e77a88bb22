use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{queue::QueueCounts, state::AppState};

#[derive(Serialize)]
struct HealthResponse {
    /// `degraded` once any job has failed.
    status: &'static str,
    version: &'static str,
    queue: String,
    jobs: QueueCounts,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let jobs = state.queue.counts().await;
    Json(HealthResponse {
        status: if jobs.failed == 0 { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        queue: state.mints_queue_name.clone(),
        jobs,
    })
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

