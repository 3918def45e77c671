// error.rs — Errors for gate evaluation and callback dispatch.

use thiserror::Error;
use uuid::Uuid;

use crate::channel::ChannelError;
use crate::diff::CompletionError;

/// Errors from review-gate operations.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review channel: {0}")]
    Channel(#[from] ChannelError),

    /// The diff backend failed or returned something unusable.
    #[error("diff synthesis: {0}")]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Queue(#[from] em_queue::QueueError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("registry lock poisoned: {0}")]
    Lock(String),

    /// A callback named a job with no pending review entry.
    #[error("no pending review for job {0}")]
    NotPending(Uuid),
}
