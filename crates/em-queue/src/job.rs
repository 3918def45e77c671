// job.rs — Job records and the queue state machine.
//
// A job is one unit of pipeline work: a stage name plus a durable JSON
// payload. The state machine enforces the queue lifecycle:
//   queued → active → {completed | failed-retry → queued |
//     delayed → queued | waiting-children}
//   waiting-children → queued   (fan-in complete)
// with completed and failed terminal — nothing leaves a terminal state.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::QueueError;

/// Queue lifecycle of a single job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker slot on its stage.
    Queued,

    /// A worker is running the stage handler.
    Active,

    /// Parked until a wake deadline or an external resume.
    Delayed,

    /// Flow parent waiting for all of its children to complete.
    WaitingChildren,

    /// Attempt failed; re-queues once the backoff pause elapses.
    FailedRetry,

    /// Terminal success.
    Completed,

    /// Terminal failure: fatal error or attempts exhausted.
    Failed { reason: String },
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => write!(f, "queued"),
            JobState::Active => write!(f, "active"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::WaitingChildren => write!(f, "waiting_children"),
            JobState::FailedRetry => write!(f, "failed_retry"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed { .. } => write!(f, "failed"),
        }
    }
}

impl JobState {
    /// Check whether transitioning from this state to `next` is valid.
    ///
    /// Terminal states have no outgoing edges; a completed or failed job
    /// can only be observed, never revived.
    pub fn can_transition_to(&self, next: &JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Active)
                | (JobState::Active, JobState::Completed)
                | (JobState::Active, JobState::Failed { .. })
                | (JobState::Active, JobState::FailedRetry)
                | (JobState::Active, JobState::Delayed)
                | (JobState::Active, JobState::WaitingChildren)
                | (JobState::WaitingChildren, JobState::Queued)
                | (JobState::WaitingChildren, JobState::Failed { .. })
                | (JobState::Delayed, JobState::Queued)
                | (JobState::FailedRetry, JobState::Queued)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed { .. })
    }
}

/// Retry pacing between failed attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Re-queue immediately.
    None,

    /// The same pause after every failure.
    Fixed { delay_secs: u64 },

    /// Doubling pause: base, 2×base, 4×base, ...
    Exponential { base_secs: u64 },
}

impl BackoffPolicy {
    /// Pause before the job re-queues after its `attempt`-th failure
    /// (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            BackoffPolicy::None => Duration::zero(),
            BackoffPolicy::Fixed { delay_secs } => Duration::seconds(delay_secs as i64),
            BackoffPolicy::Exponential { base_secs } => {
                // Shift capped so huge attempt numbers cannot overflow.
                let factor = 1u64 << attempt.saturating_sub(1).min(20);
                Duration::seconds(base_secs.saturating_mul(factor) as i64)
            }
        }
    }
}

/// Submission options: how many attempts a job gets and how retries are
/// paced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total attempts allowed, at least 1.
    pub attempts: u32,
    pub backoff: BackoffPolicy,
}

impl JobOptions {
    pub fn new(attempts: u32) -> Result<Self, QueueError> {
        if attempts == 0 {
            return Err(QueueError::InvalidOptions(
                "attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            attempts,
            backoff: BackoffPolicy::None,
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for JobOptions {
    /// Three attempts, immediate re-queue.
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: BackoffPolicy::None,
        }
    }
}

/// One unit of pipeline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,

    /// Stage name; selects the handler and the worker pool.
    pub stage: String,

    /// Durable stage input. Stages parse this into their typed payload
    /// at entry, so a job can be resumed by any worker.
    pub payload: Value,

    pub state: JobState,

    /// Attempts started so far.
    pub attempts_made: u32,

    pub options: JobOptions,

    /// Flow parent, when this job is a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,

    /// Children not yet completed (flow parents only).
    #[serde(default)]
    pub pending_children: u32,

    /// Child results keyed by child stage name; merged into the payload
    /// when the last child completes, so the parent observes all results
    /// at once.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub child_results: serde_json::Map<String, Value>,

    /// When a delayed or retrying job becomes due again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wake_at: Option<DateTime<Utc>>,

    /// Result recorded at completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(stage: impl Into<String>, payload: Value, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stage: stage.into(),
            payload,
            state: JobState::Queued,
            attempts_made: 0,
            options,
            parent_id: None,
            pending_children: 0,
            child_results: serde_json::Map::new(),
            wake_at: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to `next`. Errors when the queue FSM forbids it.
    pub fn transition(&mut self, next: JobState) -> Result<(), QueueError> {
        if !self.state.can_transition_to(&next) {
            return Err(QueueError::InvalidTransition {
                job_id: self.id,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// More attempts remain after the ones already made.
    pub fn has_attempts_left(&self) -> bool {
        self.attempts_made < self.options.attempts
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
