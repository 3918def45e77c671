// table.rs — The shared job arena.
//
// All queue state lives in one mutex-guarded map of job records. Methods
// compute the full effect of an operation under the lock — state change,
// fan-in bookkeeping, payload merges — and dispatch events only after the
// guard is dropped, so sinks never run while the table is locked. Nothing
// here awaits; async callers must not hold results of `locked()` across
// an await point (they can't — the guard never escapes this module).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{QueueError, StageError};
use crate::events::{EventDispatcher, QueueEvent};
use crate::job::{Job, JobOptions, JobState};
use crate::merge::deep_merge;

/// Ids created by one flow submission.
#[derive(Debug, Clone)]
pub struct FlowHandle {
    pub parent_id: Uuid,
    pub child_ids: Vec<Uuid>,
}

/// What a resume callback accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The job was parked and is queued again.
    Resumed,

    /// The job was already re-queued by an earlier callback and no worker
    /// has claimed it yet; the new patch overrode the earlier one (last
    /// action wins).
    Repatched,

    /// The job is past the point where callbacks apply; nothing changed.
    AlreadyHandled,
}

/// The job arena every worker, scheduler, and callback dispatcher shares.
pub struct JobTable {
    jobs: Mutex<HashMap<Uuid, Job>>,
    dispatcher: Arc<EventDispatcher>,
}

impl JobTable {
    pub fn new(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            dispatcher,
        }
    }

    fn locked(&self) -> Result<MutexGuard<'_, HashMap<Uuid, Job>>, QueueError> {
        self.jobs.lock().map_err(|e| QueueError::Lock(e.to_string()))
    }

    /// Enqueue one job. The table does not check the stage name; handler
    /// registration is the engine's concern.
    pub fn submit(
        &self,
        stage: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<Uuid, QueueError> {
        let job = Job::new(stage, payload, options);
        let id = job.id;
        let event = QueueEvent::queued(&job);
        self.locked()?.insert(id, job);
        self.dispatcher.dispatch(&event);
        Ok(id)
    }

    /// Enqueue a flow: N independent children plus a parent that waits on
    /// all of them. The parent runs only after every child completes, with
    /// `{child_stage: child_result}` deep-merged into its payload. A flow
    /// without children degenerates to a plain submission.
    pub fn submit_flow(
        &self,
        parent_stage: &str,
        payload: Value,
        children: Vec<(String, Value)>,
        options: JobOptions,
    ) -> Result<FlowHandle, QueueError> {
        let mut parent = Job::new(parent_stage, payload, options);
        if !children.is_empty() {
            parent.state = JobState::WaitingChildren;
            parent.pending_children = children.len() as u32;
        }
        let parent_id = parent.id;

        let mut child_ids = Vec::with_capacity(children.len());
        let mut records = Vec::with_capacity(children.len());
        let mut events = Vec::new();
        for (stage, child_payload) in children {
            let mut child = Job::new(stage, child_payload, options);
            child.parent_id = Some(parent_id);
            child_ids.push(child.id);
            events.push(QueueEvent::queued(&child));
            records.push(child);
        }
        if parent.state == JobState::Queued {
            events.push(QueueEvent::queued(&parent));
        }

        {
            let mut jobs = self.locked()?;
            jobs.insert(parent_id, parent);
            for child in records {
                jobs.insert(child.id, child);
            }
        }
        for event in &events {
            self.dispatcher.dispatch(event);
        }
        Ok(FlowHandle {
            parent_id,
            child_ids,
        })
    }

    /// Claim the oldest queued job of `stage`, marking it active and
    /// counting the attempt. Returns a snapshot for the worker; the
    /// record itself stays in the table.
    pub fn claim(&self, stage: &str) -> Result<Option<Job>, QueueError> {
        let claimed = {
            let mut jobs = self.locked()?;
            let next = jobs
                .values()
                .filter(|j| j.stage == stage && j.state == JobState::Queued)
                .min_by_key(|j| (j.created_at, j.id))
                .map(|j| j.id);

            match next {
                Some(id) => match jobs.get_mut(&id) {
                    Some(job) => {
                        job.transition(JobState::Active)?;
                        job.attempts_made += 1;
                        Some(job.clone())
                    }
                    None => None,
                },
                None => None,
            }
        };

        if let Some(job) = &claimed {
            self.dispatcher.dispatch(&QueueEvent::started(job));
        }
        Ok(claimed)
    }

    /// Record a successful result. Completing the last child of a flow
    /// re-queues the parent with every child result merged into its
    /// payload in one step, so the parent never sees a partial set.
    pub fn settle_complete(&self, job_id: Uuid, result: Value) -> Result<(), QueueError> {
        let mut events = Vec::new();
        {
            let mut jobs = self.locked()?;
            let job = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
            job.transition(JobState::Completed)?;
            job.result = Some(result.clone());
            job.wake_at = None;
            let parent_id = job.parent_id;
            let child_stage = job.stage.clone();
            events.push(QueueEvent::completed(job));

            if let Some(parent_id) = parent_id {
                if let Some(parent) = jobs.get_mut(&parent_id) {
                    // A parent already failed by a sibling ignores the result.
                    if parent.state == JobState::WaitingChildren {
                        parent.child_results.insert(child_stage, result);
                        parent.pending_children = parent.pending_children.saturating_sub(1);
                        if parent.pending_children == 0 {
                            let merged =
                                Value::Object(std::mem::take(&mut parent.child_results));
                            deep_merge(&mut parent.payload, &merged);
                            parent.transition(JobState::Queued)?;
                            events.push(QueueEvent::fan_in_complete(parent));
                        }
                    }
                }
            }
        }
        for event in &events {
            self.dispatcher.dispatch(event);
        }
        Ok(())
    }

    /// Record a failed attempt and schedule what happens next.
    ///
    /// Transient and output-shape errors re-queue after the backoff pause
    /// while attempts remain; output-shape errors additionally fold the
    /// bad output and its error description into the payload so the next
    /// attempt can self-correct. Fatal errors and exhausted attempts end
    /// the job — and end a parent still waiting on it, which then never
    /// executes.
    pub fn settle_fail(&self, job_id: Uuid, error: &StageError) -> Result<(), QueueError> {
        let now = Utc::now();
        let mut events = Vec::new();
        {
            let mut jobs = self.locked()?;
            let job = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;

            let retryable = !matches!(error, StageError::Fatal(_)) && job.has_attempts_left();
            if retryable {
                if let StageError::OutputShape { output, message } = error {
                    let feedback = serde_json::json!({
                        "previous_output": output,
                        "previous_error": message,
                    });
                    deep_merge(&mut job.payload, &feedback);
                }
                let wake_at = now + job.options.backoff.delay_after(job.attempts_made);
                job.transition(JobState::FailedRetry)?;
                job.wake_at = Some(wake_at);
                events.push(QueueEvent::retried(job, &error.to_string(), wake_at));
            } else {
                let reason = error.to_string();
                job.transition(JobState::Failed {
                    reason: reason.clone(),
                })?;
                job.wake_at = None;
                let parent_id = job.parent_id;
                let child_stage = job.stage.clone();
                events.push(QueueEvent::failed(job, &reason));

                if let Some(parent_id) = parent_id {
                    if let Some(parent) = jobs.get_mut(&parent_id) {
                        if parent.state == JobState::WaitingChildren {
                            let parent_reason =
                                format!("child stage {} failed: {}", child_stage, reason);
                            parent.transition(JobState::Failed {
                                reason: parent_reason.clone(),
                            })?;
                            events.push(QueueEvent::failed(parent, &parent_reason));
                        }
                    }
                }
            }
        }
        for event in &events {
            self.dispatcher.dispatch(event);
        }
        Ok(())
    }

    /// Park an active job until `wake_at` — the delayed-requeue primitive.
    /// Only an active job can park itself; anything else is an invalid
    /// transition.
    pub fn park(&self, job_id: Uuid, wake_at: DateTime<Utc>) -> Result<(), QueueError> {
        let event = {
            let mut jobs = self.locked()?;
            let job = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
            job.transition(JobState::Delayed)?;
            job.wake_at = Some(wake_at);
            QueueEvent::delayed(job, wake_at)
        };
        self.dispatcher.dispatch(&event);
        Ok(())
    }

    /// Apply an action callback to a parked job.
    ///
    /// The first callback merges `patch` into the payload and re-queues
    /// the job: at most one resume per park. Callbacks landing while the
    /// job still waits for a worker keep merging, so the last action
    /// before pickup wins. Once a worker has the job (or it finished),
    /// the callback changes nothing and reports `AlreadyHandled`.
    pub fn resume_with(&self, job_id: Uuid, patch: &Value) -> Result<ResumeOutcome, QueueError> {
        let (outcome, event) = {
            let mut jobs = self.locked()?;
            let job = jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
            match job.state {
                JobState::Delayed => {
                    deep_merge(&mut job.payload, patch);
                    job.wake_at = None;
                    job.transition(JobState::Queued)?;
                    (ResumeOutcome::Resumed, Some(QueueEvent::resumed(job)))
                }
                JobState::Queued => {
                    deep_merge(&mut job.payload, patch);
                    job.updated_at = Utc::now();
                    (ResumeOutcome::Repatched, None)
                }
                _ => (ResumeOutcome::AlreadyHandled, None),
            }
        };
        if let Some(event) = &event {
            self.dispatcher.dispatch(event);
        }
        Ok(outcome)
    }

    /// Re-admit delayed and retrying jobs whose deadline has passed.
    /// Returns how many were promoted. The schedule was announced when
    /// the job was parked or retried, so promotion itself is silent.
    pub fn promote_due(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let mut jobs = self.locked()?;
        let due: Vec<Uuid> = jobs
            .values()
            .filter(|j| {
                matches!(j.state, JobState::Delayed | JobState::FailedRetry)
                    && j.wake_at.map(|at| at <= now).unwrap_or(true)
            })
            .map(|j| j.id)
            .collect();
        let count = due.len();
        for id in due {
            if let Some(job) = jobs.get_mut(&id) {
                job.transition(JobState::Queued)?;
                job.wake_at = None;
            }
        }
        Ok(count)
    }

    /// Snapshot of one job.
    pub fn get(&self, job_id: Uuid) -> Result<Job, QueueError> {
        self.locked()?
            .get(&job_id)
            .cloned()
            .ok_or(QueueError::NotFound(job_id))
    }

    /// True while any job is queued or active.
    pub fn has_runnable_jobs(&self) -> Result<bool, QueueError> {
        Ok(self
            .locked()?
            .values()
            .any(|j| matches!(j.state, JobState::Queued | JobState::Active)))
    }

    /// True while any job could still run or wake.
    pub fn has_live_jobs(&self) -> Result<bool, QueueError> {
        Ok(self.locked()?.values().any(|j| !j.is_terminal()))
    }

    /// True while any job is queued, active, or past its wake deadline.
    /// Jobs parked into the future do not count; they wait on a callback
    /// or the clock, not on a worker.
    pub fn has_pending_work(&self, now: DateTime<Utc>) -> Result<bool, QueueError> {
        Ok(self.locked()?.values().any(|j| match j.state {
            JobState::Queued | JobState::Active => true,
            JobState::Delayed | JobState::FailedRetry => {
                j.wake_at.map(|at| at <= now).unwrap_or(true)
            }
            _ => false,
        }))
    }

    /// Snapshots of every job on `stage`, any state, oldest first.
    pub fn jobs_for_stage(&self, stage: &str) -> Result<Vec<Job>, QueueError> {
        let jobs = self.locked()?;
        let mut matching: Vec<Job> = jobs
            .values()
            .filter(|j| j.stage == stage)
            .cloned()
            .collect();
        matching.sort_by_key(|j| (j.created_at, j.id));
        Ok(matching)
    }
}
