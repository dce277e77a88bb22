use std::sync::Arc;

use tokio::sync::broadcast;

use crate::queue::FlowQueue;

/// Shared state of the status server.
pub struct AppState {
    /// Queue the worker drains.
    pub queue: Arc<FlowQueue>,
    /// Queue name jobs must carry to be accepted.
    pub mints_queue_name: String,
    /// Job lifecycle events, forwarded to WebSocket clients.
    pub event_tx: broadcast::Sender<String>,
}
