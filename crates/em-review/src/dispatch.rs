// dispatch.rs — Routes reviewer callbacks back to parked jobs.
//
// Callbacks arrive from the channel adapter as ActionEnvelopes, possibly
// hours after the prompt was posted, possibly more than once, possibly
// for jobs that already finished. The dispatcher folds each action into
// the parked job's payload and re-queues it; the stage that parked the
// job interprets the flags when it runs again. Competing callbacks
// resolve last-action-wins because every patch explicitly clears the
// flags the other actions set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use em_queue::{JobOptions, JobTable, QueueError, ResumeOutcome};

use crate::action::{ActionEnvelope, ReviewAction};
use crate::channel::ReviewChannel;
use crate::error::ReviewError;

/// Where a gated proposal came from, kept so a reviewer can ask for a
/// clean re-run. `stage` and `payload` describe the originating job as
/// it was first submitted, before any extraction output or callback
/// flags accumulated on it.
#[derive(Debug, Clone)]
pub struct ReviewOrigin {
    pub stage: String,
    pub payload: Value,
    pub options: JobOptions,
}

impl ReviewOrigin {
    pub fn new(stage: impl Into<String>, payload: Value, options: JobOptions) -> Self {
        Self {
            stage: stage.into(),
            payload,
            options,
        }
    }
}

/// Registry of reviews awaiting a callback, keyed by parked job id.
///
/// The stage that parks a job registers it here and removes it when the
/// review concludes; the dispatcher only reads. Entries survive repatch
/// cycles, so a retry still works after an earlier feedback or approve
/// landed on the same prompt.
#[derive(Clone, Default)]
pub struct PendingReviews {
    inner: Arc<Mutex<HashMap<Uuid, ReviewOrigin>>>,
}

impl PendingReviews {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, job_id: Uuid, origin: ReviewOrigin) -> Result<(), ReviewError> {
        self.locked()?.insert(job_id, origin);
        Ok(())
    }

    pub fn get(&self, job_id: Uuid) -> Result<Option<ReviewOrigin>, ReviewError> {
        Ok(self.locked()?.get(&job_id).cloned())
    }

    pub fn remove(&self, job_id: Uuid) -> Result<Option<ReviewOrigin>, ReviewError> {
        Ok(self.locked()?.remove(&job_id))
    }

    pub fn len(&self) -> Result<usize, ReviewError> {
        Ok(self.locked()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ReviewError> {
        Ok(self.locked()?.is_empty())
    }

    fn locked(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, ReviewOrigin>>, ReviewError> {
        self.inner
            .lock()
            .map_err(|e| ReviewError::Lock(e.to_string()))
    }
}

/// Applies reviewer actions to the job table and acknowledges them on
/// the channel.
pub struct GateDispatcher {
    table: Arc<JobTable>,
    pending: PendingReviews,
    channel: Arc<dyn ReviewChannel>,
}

impl GateDispatcher {
    pub fn new(
        table: Arc<JobTable>,
        pending: PendingReviews,
        channel: Arc<dyn ReviewChannel>,
    ) -> Self {
        Self {
            table,
            pending,
            channel,
        }
    }

    /// Apply one reviewer action.
    ///
    /// Approve, reject, and feedback patch the parked job and re-queue
    /// it. Retry additionally resubmits the originating job so the
    /// pipeline starts that slice over; the parked job wakes superseded
    /// and completes without writing.
    pub async fn handle(&self, envelope: &ActionEnvelope) -> Result<(), ReviewError> {
        if matches!(envelope.action, ReviewAction::Retry) {
            return self.handle_retry(envelope).await;
        }

        let patch = patch_for(&envelope.action, &envelope.reviewer);
        let outcome = self.resume(envelope.job_id, &patch).await?;
        match outcome {
            ResumeOutcome::Resumed | ResumeOutcome::Repatched => {
                self.channel
                    .edit_message(envelope.job_id, &acknowledgement(envelope))
                    .await?;
                info!(
                    job_id = %envelope.job_id,
                    action = envelope.action.name(),
                    reviewer = %envelope.reviewer,
                    ?outcome,
                    "review action applied"
                );
            }
            ResumeOutcome::AlreadyHandled => {
                self.channel
                    .notify(envelope.job_id, "This review was already handled.")
                    .await?;
            }
        }
        Ok(())
    }

    async fn handle_retry(&self, envelope: &ActionEnvelope) -> Result<(), ReviewError> {
        // Without the origin we cannot restart, and superseding the
        // parked job would drop the slice entirely. Leave it parked.
        let Some(origin) = self.pending.get(envelope.job_id)? else {
            self.channel
                .notify(
                    envelope.job_id,
                    "Cannot restart: this review is no longer tracked.",
                )
                .await?;
            return Err(ReviewError::NotPending(envelope.job_id));
        };

        let patch = patch_for(&envelope.action, &envelope.reviewer);
        match self.resume(envelope.job_id, &patch).await? {
            ResumeOutcome::AlreadyHandled => {
                self.channel
                    .notify(envelope.job_id, "This review was already handled.")
                    .await?;
            }
            outcome => {
                let new_id = self
                    .table
                    .submit(&origin.stage, origin.payload.clone(), origin.options)?;
                self.channel
                    .edit_message(envelope.job_id, &acknowledgement(envelope))
                    .await?;
                info!(
                    job_id = %envelope.job_id,
                    new_job_id = %new_id,
                    stage = %origin.stage,
                    reviewer = %envelope.reviewer,
                    ?outcome,
                    "review superseded, stage resubmitted"
                );
            }
        }
        Ok(())
    }

    async fn resume(&self, job_id: Uuid, patch: &Value) -> Result<ResumeOutcome, ReviewError> {
        match self.table.resume_with(job_id, patch) {
            Ok(outcome) => Ok(outcome),
            Err(QueueError::NotFound(_)) => {
                self.channel
                    .notify(job_id, "No pending review matches this action.")
                    .await?;
                Err(ReviewError::NotPending(job_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Consume envelopes until the sender side closes. Failures are
    /// logged and skipped; one bad callback must not stall the rest.
    pub async fn run(&self, mut actions: mpsc::Receiver<ActionEnvelope>) {
        while let Some(envelope) = actions.recv().await {
            if let Err(error) = self.handle(&envelope).await {
                warn!(
                    job_id = %envelope.job_id,
                    action = envelope.action.name(),
                    %error,
                    "review action failed"
                );
            }
        }
        info!("review action channel closed, dispatcher stopping");
    }
}

/// The payload patch for one action. Every patch clears the flags the
/// other actions set, so whichever callback merges last determines what
/// the woken stage sees.
fn patch_for(action: &ReviewAction, reviewer: &str) -> Value {
    match action {
        ReviewAction::Approve => json!({
            "approved": true,
            "verified_by": reviewer,
            "rejected": false,
            "superseded": false,
            "feedback": null,
        }),
        ReviewAction::Reject => json!({
            "rejected": true,
            "rejected_by": reviewer,
            "approved": false,
            "superseded": false,
            "feedback": null,
        }),
        ReviewAction::Feedback { text } => json!({
            "feedback": text,
            "feedback_from": reviewer,
            "approved": false,
            "rejected": false,
            "superseded": false,
        }),
        ReviewAction::Retry => json!({
            "superseded": true,
            "approved": false,
            "rejected": false,
            "feedback": null,
        }),
    }
}

fn acknowledgement(envelope: &ActionEnvelope) -> String {
    match &envelope.action {
        ReviewAction::Approve => format!("Approved by {}.", envelope.reviewer),
        ReviewAction::Reject => format!("Rejected by {}.", envelope.reviewer),
        ReviewAction::Retry => {
            format!("Retry requested by {}, starting over.", envelope.reviewer)
        }
        ReviewAction::Feedback { .. } => {
            format!("Feedback from {} received, revising.", envelope.reviewer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecordingChannel;
    use chrono::{Duration, Utc};
    use em_queue::{EventDispatcher, JobState};

    fn setup() -> (Arc<JobTable>, PendingReviews, RecordingChannel, GateDispatcher) {
        let table = Arc::new(JobTable::new(Arc::new(EventDispatcher::new())));
        let pending = PendingReviews::new();
        let channel = RecordingChannel::new();
        let dispatcher = GateDispatcher::new(
            Arc::clone(&table),
            pending.clone(),
            Arc::new(channel.clone()),
        );
        (table, pending, channel, dispatcher)
    }

    /// Submit, claim, and park a job the way a gating stage would.
    fn parked_job(table: &JobTable) -> Uuid {
        let id = table
            .submit(
                "save_to_api",
                json!({"company": "Q1", "endpoint": "emissions"}),
                JobOptions::default(),
            )
            .unwrap();
        table.claim("save_to_api").unwrap().unwrap();
        table.park(id, Utc::now() + Duration::hours(24)).unwrap();
        id
    }

    #[tokio::test]
    async fn approve_patches_and_requeues() {
        let (table, _, channel, dispatcher) = setup();
        let id = parked_job(&table);

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Approve, "alex"))
            .await
            .unwrap();

        let job = table.get(id).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.payload["approved"], true);
        assert_eq!(job.payload["verified_by"], "alex");

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text().contains("Approved by alex"));
    }

    #[tokio::test]
    async fn reject_patches_and_requeues() {
        let (table, _, _, dispatcher) = setup();
        let id = parked_job(&table);

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Reject, "sam"))
            .await
            .unwrap();

        let job = table.get(id).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.payload["rejected"], true);
        assert_eq!(job.payload["rejected_by"], "sam");
        assert_eq!(job.payload["approved"], false);
    }

    #[tokio::test]
    async fn feedback_carries_the_reviewer_text() {
        let (table, _, _, dispatcher) = setup();
        let id = parked_job(&table);

        dispatcher
            .handle(&ActionEnvelope::new(
                id,
                ReviewAction::Feedback {
                    text: "scope2 should be market-based".into(),
                },
                "alex",
            ))
            .await
            .unwrap();

        let job = table.get(id).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.payload["feedback"], "scope2 should be market-based");
        assert_eq!(job.payload["feedback_from"], "alex");
    }

    #[tokio::test]
    async fn later_action_overrides_earlier_one() {
        let (table, _, _, dispatcher) = setup();
        let id = parked_job(&table);

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Approve, "alex"))
            .await
            .unwrap();
        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Reject, "sam"))
            .await
            .unwrap();

        // Both callbacks landed before a worker claimed the job; the
        // reject cleared the approve.
        let job = table.get(id).unwrap();
        assert_eq!(job.payload["approved"], false);
        assert_eq!(job.payload["rejected"], true);
        assert_eq!(job.payload["rejected_by"], "sam");
    }

    #[tokio::test]
    async fn action_after_pickup_is_acknowledged_as_handled() {
        let (table, _, channel, dispatcher) = setup();
        let id = parked_job(&table);

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Approve, "alex"))
            .await
            .unwrap();
        // A worker claims the re-queued job before the second callback.
        table.claim("save_to_api").unwrap().unwrap();

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Reject, "sam"))
            .await
            .unwrap();

        let notices = channel.notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].text().contains("already handled"));
        // The late reject changed nothing.
        let job = table.get(id).unwrap();
        assert_eq!(job.payload["approved"], true);
    }

    #[tokio::test]
    async fn retry_supersedes_and_resubmits_the_origin() {
        let (table, pending, channel, dispatcher) = setup();
        let id = parked_job(&table);
        let origin_payload = json!({"company": "Q1", "url": "https://example.com/report.pdf"});
        pending
            .register(
                id,
                ReviewOrigin::new("extract_emissions", origin_payload.clone(), JobOptions::default()),
            )
            .unwrap();

        dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Retry, "alex"))
            .await
            .unwrap();

        // The parked job is queued again, flagged superseded.
        let job = table.get(id).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.payload["superseded"], true);

        // A fresh extraction job exists with the original input.
        let resubmitted = table.jobs_for_stage("extract_emissions").unwrap();
        assert_eq!(resubmitted.len(), 1);
        assert_eq!(resubmitted[0].payload, origin_payload);

        assert!(channel.sent()[0].text().contains("Retry requested by alex"));
    }

    #[tokio::test]
    async fn retry_without_an_origin_leaves_the_job_parked() {
        let (table, _, channel, dispatcher) = setup();
        let id = parked_job(&table);

        let err = dispatcher
            .handle(&ActionEnvelope::new(id, ReviewAction::Retry, "alex"))
            .await;
        assert!(matches!(err, Err(ReviewError::NotPending(_))));

        // Still parked: nothing was superseded, nothing resubmitted.
        assert_eq!(table.get(id).unwrap().state, JobState::Delayed);
        assert!(channel.notices()[0].text().contains("no longer tracked"));
    }

    #[tokio::test]
    async fn unknown_job_id_is_reported() {
        let (_, _, channel, dispatcher) = setup();
        let bogus = Uuid::new_v4();

        let err = dispatcher
            .handle(&ActionEnvelope::new(bogus, ReviewAction::Approve, "alex"))
            .await;
        assert!(matches!(err, Err(ReviewError::NotPending(_))));
        assert!(channel.notices()[0]
            .text()
            .contains("No pending review matches"));
    }

    #[tokio::test]
    async fn run_drains_the_action_channel() {
        let (table, _, _, dispatcher) = setup();
        let id = parked_job(&table);

        let (tx, rx) = mpsc::channel(8);
        tx.send(ActionEnvelope::new(id, ReviewAction::Approve, "alex"))
            .await
            .unwrap();
        drop(tx);

        dispatcher.run(rx).await;
        assert_eq!(table.get(id).unwrap().payload["approved"], true);
    }

    #[test]
    fn registry_register_get_remove() {
        let pending = PendingReviews::new();
        let id = Uuid::new_v4();
        assert!(pending.is_empty().unwrap());

        pending
            .register(
                id,
                ReviewOrigin::new("extract_emissions", json!({"a": 1}), JobOptions::default()),
            )
            .unwrap();
        assert_eq!(pending.len().unwrap(), 1);
        assert_eq!(
            pending.get(id).unwrap().unwrap().stage,
            "extract_emissions"
        );

        let removed = pending.remove(id).unwrap().unwrap();
        assert_eq!(removed.payload, json!({"a": 1}));
        assert!(pending.get(id).unwrap().is_none());
    }
}
