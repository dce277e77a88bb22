//! Job queue.
//!
//! `FlowQueue` is an in-process flow queue: a job may carry children, and a
//! parent only becomes runnable once every child has completed. Jobs run one
//! at a time on the worker that drives the queue.

use std::collections::{BTreeMap, VecDeque};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex, Notify};

use crate::jobs::JobProcessor;

pub type JobId = u64;

/// A job as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub name: String,
    pub queue_name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Job>,
}

impl Job {
    pub fn new(name: &str, queue_name: &str, data: Value) -> Self {
        Self {
            name: name.to_string(),
            queue_name: queue_name.to_string(),
            data,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Job>) -> Self {
        self.children = children;
        self
    }
}

/// Anything jobs can be enqueued into.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn add(&self, job: Job) -> Result<JobId>;
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    WaitingChildren,
    Waiting,
    Active,
    Completed,
    Failed,
}

/// A job tracked by the queue, children flattened into their own entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEntry {
    pub id: JobId,
    pub name: String,
    pub queue_name: String,
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<JobId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<JobId>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pending_children: usize,
}

impl JobEntry {
    fn job(&self) -> Job {
        Job::new(&self.name, &self.queue_name, self.data.clone())
    }
}

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueueCounts {
    pub waiting_children: usize,
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Default)]
struct FlowState {
    next_id: JobId,
    entries: BTreeMap<JobId, JobEntry>,
    ready: VecDeque<JobId>,
}

impl FlowState {
    fn insert(&mut self, job: Job, parent: Option<JobId>) -> JobId {
        let id = self.next_id;
        self.next_id += 1;

        let Job {
            name,
            queue_name,
            data,
            children,
        } = job;

        let status = if children.is_empty() {
            JobStatus::Waiting
        } else {
            JobStatus::WaitingChildren
        };
        self.entries.insert(
            id,
            JobEntry {
                id,
                name,
                queue_name,
                data,
                parent,
                children: Vec::new(),
                status,
                result: None,
                error: None,
                pending_children: children.len(),
            },
        );

        let child_ids: Vec<JobId> = children
            .into_iter()
            .map(|child| self.insert(child, Some(id)))
            .collect();
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.children = child_ids;
        }

        if status == JobStatus::Waiting {
            self.ready.push_back(id);
        }
        id
    }
}

pub struct FlowQueue {
    state: Mutex<FlowState>,
    notify: Notify,
    /// Broadcast channel for job lifecycle events (JSON strings).
    event_tx: broadcast::Sender<String>,
}

impl FlowQueue {
    pub fn new(event_tx: broadcast::Sender<String>) -> Self {
        Self {
            state: Mutex::new(FlowState::default()),
            notify: Notify::new(),
            event_tx,
        }
    }

    /// Snapshot of every job the queue has seen, ordered by id.
    pub async fn jobs(&self) -> Vec<JobEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    pub async fn get(&self, id: JobId) -> Option<JobEntry> {
        self.state.lock().await.entries.get(&id).cloned()
    }

    pub async fn counts(&self) -> QueueCounts {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for entry in state.entries.values() {
            match entry.status {
                JobStatus::WaitingChildren => counts.waiting_children += 1,
                JobStatus::Waiting => counts.waiting += 1,
                JobStatus::Active => counts.active += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Pop the next runnable job and mark it active.
    pub async fn next_ready(&self) -> Option<(JobId, Job)> {
        let mut state = self.state.lock().await;
        let id = state.ready.pop_front()?;
        let entry = state.entries.get_mut(&id)?;
        entry.status = JobStatus::Active;
        Some((id, entry.job()))
    }

    /// Record a successful run. Releases the parent once its last child completes.
    pub async fn complete(&self, id: JobId, result: Value) {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(&id) else {
            return;
        };
        entry.status = JobStatus::Completed;
        entry.result = Some(result.clone());
        let name = entry.name.clone();
        let parent = entry.parent;

        let mut released = None;
        if let Some(parent_id) = parent {
            if let Some(parent) = state.entries.get_mut(&parent_id) {
                parent.pending_children = parent.pending_children.saturating_sub(1);
                if parent.pending_children == 0 && parent.status == JobStatus::WaitingChildren {
                    parent.status = JobStatus::Waiting;
                    released = Some(parent_id);
                }
            }
        }
        if let Some(parent_id) = released {
            state.ready.push_back(parent_id);
            tracing::debug!(job_id = parent_id, "all children completed, parent released");
        }
        drop(state);

        if released.is_some() {
            self.notify.notify_one();
        }

        self.broadcast_event(serde_json::json!({
            "type": "job:completed",
            "jobId": id,
            "name": name,
            "result": result
        }));
    }

    /// Record a failed run. A failed child leaves its parent waiting.
    pub async fn fail(&self, id: JobId, error: &str) {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.get_mut(&id) else {
            return;
        };
        entry.status = JobStatus::Failed;
        entry.error = Some(error.to_string());
        let name = entry.name.clone();
        drop(state);

        self.broadcast_event(serde_json::json!({
            "type": "job:failed",
            "jobId": id,
            "name": name,
            "error": error
        }));

        tracing::error!(job_id = id, job = %name, error = %error, "job failed");
    }

    /// Run a single job through the processor and record the outcome.
    async fn run_one(&self, processor: &JobProcessor, id: JobId, job: Job) {
        tracing::debug!(job_id = id, job = %job.name, "job started");
        match processor.process(&job).await {
            Ok(output) => {
                let result = serde_json::to_value(&output).unwrap_or(Value::Null);
                self.complete(id, result).await;
            }
            Err(e) => self.fail(id, &format!("{:#}", e)).await,
        }
    }

    /// Process jobs until nothing is runnable. Returns the final counts.
    pub async fn run_until_idle(&self, processor: &JobProcessor) -> QueueCounts {
        while let Some((id, job)) = self.next_ready().await {
            self.run_one(processor, id, job).await;
        }
        self.counts().await
    }

    /// Process jobs as they become runnable until `shutdown` flips to true.
    pub async fn run(&self, processor: &JobProcessor, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("queue worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Some((id, job)) = self.next_ready().await {
                self.run_one(processor, id, job).await;
                continue;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!("queue worker stopped");
    }

    fn broadcast_event(&self, event: Value) {
        let _ = self.event_tx.send(event.to_string());
    }
}

#[async_trait]
impl JobQueue for FlowQueue {
    async fn add(&self, job: Job) -> Result<JobId> {
        let name = job.name.clone();
        let child_count = job.children.len();
        let id = self.state.lock().await.insert(job, None);
        self.notify.notify_one();

        self.broadcast_event(serde_json::json!({
            "type": "job:added",
            "jobId": id,
            "name": name,
            "children": child_count
        }));

        tracing::info!(job_id = id, job = %name, children = child_count, "job enqueued");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> FlowQueue {
        let (event_tx, _) = broadcast::channel(16);
        FlowQueue::new(event_tx)
    }

    fn flow() -> Job {
        Job::new("PARENT", "mints", Value::Null).with_children(vec![
            Job::new("CHILD", "mints", serde_json::json!({"n": 0})),
            Job::new("CHILD", "mints", serde_json::json!({"n": 1})),
        ])
    }

    #[tokio::test]
    async fn children_run_before_parent() {
        let queue = queue();
        let parent_id = queue.add(flow()).await.unwrap();

        let counts = queue.counts().await;
        assert_eq!(counts.waiting_children, 1);
        assert_eq!(counts.waiting, 2);

        let (first, job) = queue.next_ready().await.unwrap();
        assert_eq!(job.name, "CHILD");
        queue.complete(first, Value::Null).await;
        assert_eq!(
            queue.get(parent_id).await.unwrap().status,
            JobStatus::WaitingChildren
        );

        let (second, _) = queue.next_ready().await.unwrap();
        queue.complete(second, Value::Null).await;

        let (next, job) = queue.next_ready().await.unwrap();
        assert_eq!(next, parent_id);
        assert_eq!(job.name, "PARENT");
        assert!(job.children.is_empty());
    }

    #[tokio::test]
    async fn failed_child_keeps_parent_waiting() {
        let queue = queue();
        let parent_id = queue.add(flow()).await.unwrap();

        let (first, _) = queue.next_ready().await.unwrap();
        queue.fail(first, "upload rejected").await;
        let (second, _) = queue.next_ready().await.unwrap();
        queue.complete(second, Value::Null).await;

        assert!(queue.next_ready().await.is_none());
        let parent = queue.get(parent_id).await.unwrap();
        assert_eq!(parent.status, JobStatus::WaitingChildren);
        let failed = queue.get(first).await.unwrap();
        assert_eq!(failed.error.as_deref(), Some("upload rejected"));
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let (event_tx, mut rx) = broadcast::channel(16);
        let queue = FlowQueue::new(event_tx);
        let id = queue.add(Job::new("SOLO", "mints", Value::Null)).await.unwrap();
        queue.next_ready().await.unwrap();
        queue.complete(id, serde_json::json!({"ok": true})).await;

        let added: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(added["type"], "job:added");
        let completed: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(completed["type"], "job:completed");
        assert_eq!(completed["result"]["ok"], true);
    }

    #[test]
    fn job_wire_shape_is_camel_case() {
        let job: Job = serde_json::from_str(
            r#"{"name":"UPLOAD_RESOURCE","queueName":"mints","data":{"tokenId":1,"assetId":2}}"#,
        )
        .unwrap();
        assert_eq!(job.queue_name, "mints");
        assert!(job.children.is_empty());
        let encoded = serde_json::to_value(&job).unwrap();
        assert!(encoded.get("children").is_none());
    }
}
