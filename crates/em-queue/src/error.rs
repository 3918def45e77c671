// error.rs — Error types for the job engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors from job-table and engine operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The requested job does not exist in the table.
    #[error("job not found: {0}")]
    NotFound(Uuid),

    /// The queue state machine forbids this transition.
    #[error("invalid transition from {from} to {to} for job {job_id}")]
    InvalidTransition {
        job_id: Uuid,
        from: String,
        to: String,
    },

    #[error("invalid job options: {0}")]
    InvalidOptions(String),

    /// Submission named a stage no handler is registered for.
    #[error("no handler registered for stage {0:?}")]
    UnknownStage(String),

    #[error("job table lock poisoned: {0}")]
    Lock(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An event sink failed (non-fatal, logged by the dispatcher).
    #[error("event sink error: {0}")]
    Sink(String),
}

/// How one stage attempt failed.
///
/// The engine schedules each variant differently: transient failures
/// retry with backoff while attempts remain; output-shape failures retry
/// with the bad output folded back into the payload so the next attempt
/// can correct itself; fatal failures end the job immediately.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{0}")]
    Transient(String),

    /// The stage's own output did not match the expected shape. Carries
    /// the raw output alongside what was wrong with it.
    #[error("output shape: {message}")]
    OutputShape { output: String, message: String },

    /// Domain-invariant violation, surfaced verbatim and never retried.
    #[error("{0}")]
    Fatal(String),
}

impl StageError {
    pub fn transient(message: impl Into<String>) -> Self {
        StageError::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        StageError::Fatal(message.into())
    }

    /// Classification name for logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Transient(_) => "transient",
            StageError::OutputShape { .. } => "output_shape",
            StageError::Fatal(_) => "fatal",
        }
    }
}
