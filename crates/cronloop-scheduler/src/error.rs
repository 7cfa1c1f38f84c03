use cronloop_core::CronError;
use thiserror::Error;

/// Errors raised by a [`crate::store::JobStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A run `data` payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Job not found: {name}")]
    JobNotFound { name: String },

    /// The run does not exist or already reached a terminal status.
    #[error("Run {id} is not in progress")]
    RunNotOpen { id: String },
}

/// Errors raised by a [`crate::queue::Queue`] when a submission is refused.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The consumer side of the queue is gone; nothing will ever fire.
    #[error("queue is closed")]
    Closed,

    #[error("queue rejected task: {0}")]
    Rejected(String),
}

impl From<StoreError> for CronError {
    fn from(e: StoreError) -> Self {
        CronError::Store(e.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
