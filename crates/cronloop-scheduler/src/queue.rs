use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};
use uuid::Uuid;

use cronloop_core::Cadence;

use crate::error::QueueError;

/// What a queue entry does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    /// One-shot execution of a single job.
    Job { name: String },
    /// A cadence tick: run every job of the cadence, then re-arm.
    Dispatch { cadence: Cadence },
}

/// Opaque id of a submitted queue entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A queue entry as delivered to the worker loop once it is due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub handle: TaskHandle,
    pub run_at: DateTime<Utc>,
    pub payload: TaskPayload,
}

/// Delayed-invocation backend: deliver `payload` no earlier than `at`.
pub trait Queue: Send + Sync {
    fn schedule_at(&self, at: DateTime<Utc>, payload: TaskPayload) -> Result<TaskHandle, QueueError>;
}

/// In-process queue backed by tokio timers.
///
/// Each submission spawns a timer task on `runtime`; when it elapses the
/// [`QueuedTask`] is sent to the receiver returned by [`LocalQueue::new`],
/// which the [`crate::engine::CronEngine`] drains. Entries live only as long
/// as the process.
pub struct LocalQueue {
    runtime: Handle,
    tx: mpsc::Sender<QueuedTask>,
    pending: Arc<DashMap<TaskHandle, QueuedTask>>,
}

impl LocalQueue {
    pub fn new(runtime: Handle, capacity: usize) -> (Self, mpsc::Receiver<QueuedTask>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            runtime,
            tx,
            pending: Arc::new(DashMap::new()),
        };
        (queue, rx)
    }

    /// Entries submitted but not yet delivered, earliest first.
    pub fn pending(&self) -> Vec<QueuedTask> {
        let mut tasks: Vec<QueuedTask> = self.pending.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by_key(|t| t.run_at);
        tasks
    }
}

impl Queue for LocalQueue {
    fn schedule_at(&self, at: DateTime<Utc>, payload: TaskPayload) -> Result<TaskHandle, QueueError> {
        if self.tx.is_closed() {
            return Err(QueueError::Closed);
        }

        let task = QueuedTask {
            handle: TaskHandle::new(),
            run_at: at,
            payload,
        };
        let handle = task.handle.clone();
        // Past instants fire immediately.
        let delay = (at - Utc::now()).to_std().unwrap_or_default();

        self.pending.insert(handle.clone(), task.clone());
        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove(&task.handle);
            let handle = task.handle.clone();
            if tx.send(task).await.is_err() {
                error!(%handle, "worker loop is gone; queued task dropped");
            }
        });

        debug!(%handle, run_at = %at, "task queued");
        Ok(handle)
    }
}
