// engine.rs — Worker pools, the wake scheduler, and the engine lifecycle.
//
// The engine spawns one tokio task per worker slot per stage. Workers
// poll the table for queued jobs on their stage, run the handler, and
// settle the result; a single scheduler task promotes delayed and
// retrying jobs whose deadline has passed. Shutdown is a watch flag:
// workers finish the job in hand and exit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::QueueError;
use crate::handler::{JobContext, StageHandler, StageOutcome};
use crate::job::JobOptions;
use crate::table::{FlowHandle, JobTable, ResumeOutcome};

/// Per-stage execution settings.
#[derive(Debug, Clone, Copy)]
pub struct StageOptions {
    /// Worker slots polling this stage.
    pub concurrency: usize,
}

impl StageOptions {
    /// One worker; jobs on this stage run strictly in order.
    pub fn serial() -> Self {
        Self { concurrency: 1 }
    }

    pub fn concurrent(workers: usize) -> Self {
        Self {
            concurrency: workers.max(1),
        }
    }
}

impl Default for StageOptions {
    fn default() -> Self {
        Self { concurrency: 10 }
    }
}

struct StageRegistration {
    handler: Arc<dyn StageHandler>,
    options: StageOptions,
}

/// Builds the set of stages, then [`start`](Engine::start)s the pools.
pub struct Engine {
    table: Arc<JobTable>,
    stages: HashMap<String, StageRegistration>,
    poll_interval: Duration,
}

impl Engine {
    pub fn new(table: Arc<JobTable>) -> Self {
        Self {
            table,
            stages: HashMap::new(),
            poll_interval: Duration::from_millis(25),
        }
    }

    /// How often idle workers and the scheduler re-check the table.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Register the handler for a stage. Registering the same stage
    /// twice replaces the earlier handler.
    pub fn register(
        &mut self,
        stage: impl Into<String>,
        handler: Arc<dyn StageHandler>,
        options: StageOptions,
    ) {
        self.stages
            .insert(stage.into(), StageRegistration { handler, options });
    }

    /// Spawn the worker pools and the scheduler. The returned handle
    /// submits work and ends the engine.
    pub fn start(self) -> EngineHandle {
        let Engine {
            table,
            stages,
            poll_interval,
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut known_stages = HashSet::new();
        let mut tasks = Vec::new();

        for (stage, registration) in stages {
            known_stages.insert(stage.clone());
            for _ in 0..registration.options.concurrency {
                tasks.push(tokio::spawn(worker_loop(
                    Arc::clone(&table),
                    stage.clone(),
                    Arc::clone(&registration.handler),
                    poll_interval,
                    shutdown_rx.clone(),
                )));
            }
        }
        tasks.push(tokio::spawn(scheduler_loop(
            Arc::clone(&table),
            poll_interval,
            shutdown_rx,
        )));

        EngineHandle {
            table,
            known_stages,
            poll_interval,
            tasks,
            shutdown_tx,
        }
    }
}

/// Live engine: submit jobs and flows, deliver callbacks, shut down.
pub struct EngineHandle {
    table: Arc<JobTable>,
    known_stages: HashSet<String>,
    poll_interval: Duration,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl EngineHandle {
    /// Enqueue one job on a registered stage.
    pub fn submit(
        &self,
        stage: &str,
        payload: Value,
        options: JobOptions,
    ) -> Result<Uuid, QueueError> {
        self.ensure_known(stage)?;
        self.table.submit(stage, payload, options)
    }

    /// Enqueue a flow; every named stage must be registered.
    pub fn submit_flow(
        &self,
        parent_stage: &str,
        payload: Value,
        children: Vec<(String, Value)>,
        options: JobOptions,
    ) -> Result<FlowHandle, QueueError> {
        self.ensure_known(parent_stage)?;
        for (child_stage, _) in &children {
            self.ensure_known(child_stage)?;
        }
        self.table.submit_flow(parent_stage, payload, children, options)
    }

    /// Deliver an external callback to a parked job.
    pub fn resume_with(&self, job_id: Uuid, patch: &Value) -> Result<ResumeOutcome, QueueError> {
        self.table.resume_with(job_id, patch)
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    fn ensure_known(&self, stage: &str) -> Result<(), QueueError> {
        if self.known_stages.contains(stage) {
            Ok(())
        } else {
            Err(QueueError::UnknownStage(stage.to_string()))
        }
    }

    /// Wait until no job is queued, active, or past its wake deadline.
    /// Jobs parked into the future are not counted: they wait on a
    /// callback or the clock, and the engine is idle until then.
    pub async fn wait_until_idle(&self) -> Result<(), QueueError> {
        loop {
            if !self.table.has_pending_work(Utc::now())? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Signal every worker and the scheduler to stop, then wait for them.
    /// Jobs already claimed finish their current attempt.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn worker_loop(
    table: Arc<JobTable>,
    stage: String,
    handler: Arc<dyn StageHandler>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let claimed = match table.claim(&stage) {
            Ok(claimed) => claimed,
            Err(e) => {
                // A poisoned table cannot recover; stop this worker.
                tracing::error!(stage = %stage, error = %e, "claim failed");
                return;
            }
        };

        let Some(job) = claimed else {
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown_rx.changed() => {}
            }
            continue;
        };

        let job_id = job.id;
        let ctx = JobContext::from_job(&job);
        let settled = match handler.run(ctx).await {
            Ok(StageOutcome::Complete(result)) => table.settle_complete(job_id, result),
            Ok(StageOutcome::Park { wake_at }) => table.park(job_id, wake_at),
            Err(error) => {
                tracing::warn!(
                    stage = %stage,
                    job_id = %job_id,
                    kind = error.kind(),
                    error = %error,
                    "stage attempt failed"
                );
                table.settle_fail(job_id, &error)
            }
        };
        if let Err(e) = settled {
            tracing::error!(stage = %stage, job_id = %job_id, error = %e, "settle failed");
        }
    }
}

async fn scheduler_loop(
    table: Arc<JobTable>,
    poll_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                match table.promote_due(Utc::now()) {
                    Ok(0) => {}
                    Ok(promoted) => tracing::debug!(promoted, "re-queued due jobs"),
                    Err(e) => tracing::error!(error = %e, "promotion sweep failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StageError;
    use crate::events::EventDispatcher;
    use crate::job::{BackoffPolicy, JobState};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    fn start_engine(stages: Vec<(&str, Arc<dyn StageHandler>, StageOptions)>) -> EngineHandle {
        let table = Arc::new(JobTable::new(Arc::new(EventDispatcher::new())));
        let mut engine =
            Engine::new(table).with_poll_interval(Duration::from_millis(5));
        for (stage, handler, options) in stages {
            engine.register(stage, handler, options);
        }
        engine.start()
    }

    struct Echo;

    #[async_trait::async_trait]
    impl StageHandler for Echo {
        async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
            Ok(StageOutcome::Complete(json!({"echoed": ctx.payload})))
        }
    }

    /// Fails transiently until `failures` attempts have been burned.
    struct FlakyUntil {
        failures: u32,
        seen: AtomicU32,
    }

    #[async_trait::async_trait]
    impl StageHandler for FlakyUntil {
        async fn run(&self, _ctx: JobContext) -> Result<StageOutcome, StageError> {
            let attempt = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(StageError::transient("backend unavailable"))
            } else {
                Ok(StageOutcome::Complete(json!({"attempt": attempt})))
            }
        }
    }

    #[tokio::test]
    async fn completes_a_job_and_records_the_result() {
        let handle = start_engine(vec![("echo", Arc::new(Echo), StageOptions::serial())]);
        let id = handle
            .submit("echo", json!({"n": 7}), JobOptions::default())
            .unwrap();

        handle.wait_until_idle().await.unwrap();

        let job = handle.table().get(id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.unwrap()["echoed"]["n"], 7);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn submitting_to_an_unregistered_stage_is_rejected() {
        let handle = start_engine(vec![("echo", Arc::new(Echo), StageOptions::serial())]);
        let err = handle.submit("nope", json!({}), JobOptions::default());
        assert!(matches!(err, Err(QueueError::UnknownStage(_))));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let handler = Arc::new(FlakyUntil {
            failures: 2,
            seen: AtomicU32::new(0),
        });
        let handle = start_engine(vec![(
            "extract",
            Arc::clone(&handler) as Arc<dyn StageHandler>,
            StageOptions::serial(),
        )]);

        let id = handle
            .submit("extract", json!({}), JobOptions::new(3).unwrap())
            .unwrap();
        handle.wait_until_idle().await.unwrap();

        let job = handle.table().get(id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts_made, 3);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_attempts_end_in_failure() {
        let handler = Arc::new(FlakyUntil {
            failures: u32::MAX,
            seen: AtomicU32::new(0),
        });
        let handle = start_engine(vec![(
            "extract",
            handler as Arc<dyn StageHandler>,
            StageOptions::serial(),
        )]);

        let id = handle
            .submit("extract", json!({}), JobOptions::new(2).unwrap())
            .unwrap();
        handle.wait_until_idle().await.unwrap();

        let job = handle.table().get(id).unwrap();
        assert!(matches!(job.state, JobState::Failed { .. }));
        assert_eq!(job.attempts_made, 2);
        handle.shutdown().await;
    }

    /// Rejects its own first output, then reads the fed-back error on the
    /// next attempt.
    struct ShapeSensitive;

    #[async_trait::async_trait]
    impl StageHandler for ShapeSensitive {
        async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
            if ctx.payload.get("previous_error").is_none() {
                return Err(StageError::OutputShape {
                    output: "scope one hundred".to_string(),
                    message: "totals must be numbers".to_string(),
                });
            }
            Ok(StageOutcome::Complete(json!({
                "corrected_from": ctx.payload["previous_output"],
            })))
        }
    }

    #[tokio::test]
    async fn output_shape_feedback_reaches_the_next_attempt() {
        let handle = start_engine(vec![(
            "format",
            Arc::new(ShapeSensitive),
            StageOptions::serial(),
        )]);

        let id = handle
            .submit("format", json!({}), JobOptions::default())
            .unwrap();
        handle.wait_until_idle().await.unwrap();

        let job = handle.table().get(id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.unwrap()["corrected_from"], "scope one hundred");
        handle.shutdown().await;
    }

    struct Constant(Value);

    #[async_trait::async_trait]
    impl StageHandler for Constant {
        async fn run(&self, _ctx: JobContext) -> Result<StageOutcome, StageError> {
            Ok(StageOutcome::Complete(self.0.clone()))
        }
    }

    /// Completes with the payload it received, recording that it ran.
    struct Witness {
        ran: AtomicBool,
    }

    #[async_trait::async_trait]
    impl StageHandler for Witness {
        async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(StageOutcome::Complete(ctx.payload))
        }
    }

    #[tokio::test]
    async fn flow_parent_runs_with_all_child_results_merged() {
        let witness = Arc::new(Witness {
            ran: AtomicBool::new(false),
        });
        let handle = start_engine(vec![
            (
                "company_lookup",
                Arc::new(Constant(json!({"node": "Q123"}))) as Arc<dyn StageHandler>,
                StageOptions::default(),
            ),
            (
                "fiscal_year",
                Arc::new(Constant(json!({"start_month": 4, "end_month": 3}))),
                StageOptions::default(),
            ),
            (
                "extract",
                Arc::clone(&witness) as Arc<dyn StageHandler>,
                StageOptions::serial(),
            ),
        ]);

        let flow = handle
            .submit_flow(
                "extract",
                json!({"url": "u"}),
                vec![
                    ("company_lookup".to_string(), json!({})),
                    ("fiscal_year".to_string(), json!({})),
                ],
                JobOptions::default(),
            )
            .unwrap();
        handle.wait_until_idle().await.unwrap();

        assert!(witness.ran.load(Ordering::SeqCst));
        let parent = handle.table().get(flow.parent_id).unwrap();
        assert_eq!(parent.state, JobState::Completed);
        let result = parent.result.unwrap();
        assert_eq!(result["company_lookup"]["node"], "Q123");
        assert_eq!(result["fiscal_year"]["start_month"], 4);
        assert_eq!(result["url"], "u");
        handle.shutdown().await;
    }

    struct AlwaysFatal;

    #[async_trait::async_trait]
    impl StageHandler for AlwaysFatal {
        async fn run(&self, _ctx: JobContext) -> Result<StageOutcome, StageError> {
            Err(StageError::fatal("company does not exist"))
        }
    }

    #[tokio::test]
    async fn child_failure_fails_the_parent_without_running_it() {
        let witness = Arc::new(Witness {
            ran: AtomicBool::new(false),
        });
        let handle = start_engine(vec![
            (
                "company_lookup",
                Arc::new(AlwaysFatal) as Arc<dyn StageHandler>,
                StageOptions::serial(),
            ),
            (
                "extract",
                Arc::clone(&witness) as Arc<dyn StageHandler>,
                StageOptions::serial(),
            ),
        ]);

        let flow = handle
            .submit_flow(
                "extract",
                json!({}),
                vec![("company_lookup".to_string(), json!({}))],
                JobOptions::new(1).unwrap(),
            )
            .unwrap();
        handle.wait_until_idle().await.unwrap();

        let parent = handle.table().get(flow.parent_id).unwrap();
        assert!(matches!(parent.state, JobState::Failed { .. }));
        assert!(!witness.ran.load(Ordering::SeqCst));
        handle.shutdown().await;
    }

    /// Parks until an approval flag appears in the payload.
    struct GateLike;

    #[async_trait::async_trait]
    impl StageHandler for GateLike {
        async fn run(&self, ctx: JobContext) -> Result<StageOutcome, StageError> {
            if ctx.payload.get("approved") == Some(&json!(true)) {
                Ok(StageOutcome::Complete(
                    json!({"committed_by": ctx.payload["verified_by"]}),
                ))
            } else {
                Ok(StageOutcome::Park {
                    wake_at: Utc::now() + chrono::Duration::hours(24),
                })
            }
        }
    }

    #[tokio::test]
    async fn parked_job_resumes_on_callback_and_completes() {
        let handle = start_engine(vec![(
            "save",
            Arc::new(GateLike) as Arc<dyn StageHandler>,
            StageOptions::serial(),
        )]);

        let id = handle
            .submit("save", json!({"scope1": 100.0}), JobOptions::default())
            .unwrap();

        handle.wait_until_idle().await.unwrap();
        assert_eq!(handle.table().get(id).unwrap().state, JobState::Delayed);

        let outcome = handle
            .resume_with(id, &json!({"approved": true, "verified_by": "alex"}))
            .unwrap();
        assert_eq!(outcome, ResumeOutcome::Resumed);

        handle.wait_until_idle().await.unwrap();
        let job = handle.table().get(id).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.result.unwrap()["committed_by"], "alex");
        handle.shutdown().await;
    }

    struct Counter(Arc<AtomicU32>);

    #[async_trait::async_trait]
    impl StageHandler for Counter {
        async fn run(&self, _ctx: JobContext) -> Result<StageOutcome, StageError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutcome::Complete(json!({})))
        }
    }

    #[tokio::test]
    async fn concurrent_workers_run_each_job_exactly_once() {
        let count = Arc::new(AtomicU32::new(0));
        let handle = start_engine(vec![(
            "save",
            Arc::new(Counter(Arc::clone(&count))) as Arc<dyn StageHandler>,
            StageOptions::concurrent(4),
        )]);

        for n in 0..20 {
            handle.submit("save", json!({"n": n}), JobOptions::default()).unwrap();
        }
        handle.wait_until_idle().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 20);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn idle_engine_reports_idle_immediately() {
        let handle = start_engine(vec![("echo", Arc::new(Echo), StageOptions::serial())]);
        handle.wait_until_idle().await.unwrap();
        handle.shutdown().await;
    }
}
