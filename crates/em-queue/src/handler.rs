// handler.rs — The contract between the engine and stage implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::error::StageError;
use crate::job::Job;

/// What the engine should do with the job after the handler returns.
#[derive(Debug)]
pub enum StageOutcome {
    /// Record the result and mark the job completed.
    Complete(Value),

    /// Park the job until `wake_at` or until an external callback
    /// resumes it, whichever comes first. The handler runs again from
    /// the top with the patched payload.
    Park { wake_at: DateTime<Utc> },
}

/// Snapshot of a claimed job handed to its stage handler.
///
/// Handlers never touch the table directly; everything they may read is
/// here, and everything they decide is returned as a [`StageOutcome`] or
/// a [`StageError`].
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: Uuid,
    pub stage: String,
    pub payload: Value,

    /// 1 on the first run, counting up to `max_attempts`.
    pub attempt: u32,
    pub max_attempts: u32,
}

impl JobContext {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            stage: job.stage.clone(),
            payload: job.payload.clone(),
            attempt: job.attempts_made,
            max_attempts: job.options.attempts,
        }
    }

    /// Parse the payload into the stage's typed input. A payload that
    /// does not parse can never succeed on retry, so the error is fatal.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StageError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| StageError::fatal(format!("payload does not parse: {}", e)))
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// One pipeline stage.
///
/// Implementations must be stateless with respect to individual jobs:
/// a job can be retried or resumed on any worker, so everything the
/// stage needs must come from the payload.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError>;
}
