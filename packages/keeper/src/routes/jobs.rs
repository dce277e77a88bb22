use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    jobs::JobKind,
    queue::{Job, JobEntry, JobId, JobQueue, JobStatus},
    state::AppState,
};

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<JobStatus>,
}

/// `GET /api/jobs`: every job the queue has seen, optionally by status.
async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<JobEntry>> {
    let mut jobs = state.queue.jobs().await;
    if let Some(status) = query.status {
        jobs.retain(|j| j.status == status);
    }
    Json(jobs)
}

/// `GET /api/jobs/:id`
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<JobId>,
) -> Result<Json<JobEntry>, StatusCode> {
    state.queue.get(id).await.map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize)]
struct EnqueueResponse {
    id: JobId,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Reject jobs no handler understands before they reach the worker.
fn validate(job: &Job, queue_name: &str) -> Result<(), String> {
    if job.queue_name != queue_name {
        return Err(format!(
            "job {} targets queue {}, expected {}",
            job.name, job.queue_name, queue_name
        ));
    }
    JobKind::from_job(job).map_err(|e| e.to_string())?;
    job.children.iter().try_for_each(|c| validate(c, queue_name))
}

/// `POST /api/jobs`: enqueue a job (with optional children).
async fn enqueue_job(
    State(state): State<Arc<AppState>>,
    Json(job): Json<Job>,
) -> Result<(StatusCode, Json<EnqueueResponse>), (StatusCode, Json<ErrorResponse>)> {
    validate(&job, &state.mints_queue_name)
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })))?;

    let id = state.queue.add(job).await.map_err(|e| {
        tracing::error!(error = %e, "failed to enqueue job");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
    })?;

    Ok((StatusCode::CREATED, Json(EnqueueResponse { id })))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs).post(enqueue_job))
        .route("/jobs/{id}", get(get_job))
}
