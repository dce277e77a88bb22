mod health;
mod jobs;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the `/api` sub-router with all API routes.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .with_state(state)
}

/// Full status server: `/api/*` plus the `/ws` event stream.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_router(state.clone()))
        .merge(ws::router().with_state(state))
        .layer(CorsLayer::very_permissive())
}
