use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{queue::QueueCounts, state::AppState};

#[derive(Debug, Deserialize)]
struct WsQuery {
    /// Only forward events for this job name.
    job: Option<String>,
}

/// `GET /ws`: live job lifecycle events.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let rx = state.event_tx.subscribe();
    let counts = state.queue.counts().await;
    ws.on_upgrade(move |socket| handle_socket(socket, rx, counts, query.job))
}

/// Whether a serialized event should reach a client filtering on `job`.
fn wants(event: &str, job: Option<&str>) -> bool {
    let Some(job) = job else {
        return true;
    };
    serde_json::from_str::<serde_json::Value>(event)
        .ok()
        .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(|n| n == job))
        .unwrap_or(false)
}

async fn handle_socket(
    mut socket: WebSocket,
    mut rx: broadcast::Receiver<String>,
    counts: QueueCounts,
    job: Option<String>,
) {
    tracing::info!(filter = ?job, "event stream client connected");

    let snapshot = serde_json::json!({"type": "queue:snapshot", "counts": counts}).to_string();
    if socket.send(Message::Text(snapshot.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) if wants(&event, job.as_deref()) => {
                        if socket.send(Message::Text(event.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "event stream client lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!("event stream client disconnected");
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}
