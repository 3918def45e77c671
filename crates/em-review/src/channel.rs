// channel.rs — The outbound review-channel contract and its adapters.
//
// A ReviewChannel carries everything the pipeline says to reviewers:
// prompts that demand a decision, edits to earlier messages, and plain
// notices. Implementations target a medium (a chat thread, a terminal,
// the log); the inbound half — turning a button press or a typed reply
// into an ActionEnvelope — is the adapter's own affair and reaches the
// dispatcher through an mpsc sender, never through this trait.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use em_queue::{EventSink, QueueError, QueueEvent};

/// Errors from review-channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The medium went away (thread deleted, transport gone).
    #[error("channel closed")]
    Closed,

    #[error("channel error: {0}")]
    Other(String),
}

/// Outbound messages to reviewers, keyed by the job they concern.
///
/// Every method takes the job id so the medium can thread messages per
/// job and embed the id in interactive actions. Failures are surfaced to
/// the caller; the gate treats an unreachable channel as a transient
/// stage error, never as silent approval.
#[async_trait]
pub trait ReviewChannel: Send + Sync {
    /// Post a prompt offering `actions` and demanding a reviewer
    /// decision for `job_id`.
    async fn post_prompt(
        &self,
        job_id: Uuid,
        text: &str,
        actions: &[&str],
    ) -> Result<(), ChannelError>;

    /// Replace the latest message for `job_id` (progress updates).
    async fn edit_message(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError>;

    /// Plain notice requiring no response.
    async fn notify(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError>;
}

/// A channel that writes everything to the tracing log.
///
/// The daemon default when no chat transport is configured: prompts are
/// visible to an operator tailing the log, and no action callbacks ever
/// arrive (parked jobs then wake only via the re-poll interval).
pub struct LogChannel;

#[async_trait]
impl ReviewChannel for LogChannel {
    async fn post_prompt(
        &self,
        job_id: Uuid,
        text: &str,
        actions: &[&str],
    ) -> Result<(), ChannelError> {
        tracing::info!(job_id = %job_id, actions = ?actions, "review prompt:\n{}", text);
        Ok(())
    }

    async fn edit_message(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError> {
        tracing::info!(job_id = %job_id, "{}", text);
        Ok(())
    }

    async fn notify(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError> {
        tracing::info!(job_id = %job_id, "{}", text);
        Ok(())
    }
}

/// One message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Prompt {
        job_id: Uuid,
        text: String,
        actions: Vec<String>,
    },
    Edit {
        job_id: Uuid,
        text: String,
    },
    Notice {
        job_id: Uuid,
        text: String,
    },
}

impl Outgoing {
    pub fn job_id(&self) -> Uuid {
        match *self {
            Outgoing::Prompt { job_id, .. }
            | Outgoing::Edit { job_id, .. }
            | Outgoing::Notice { job_id, .. } => job_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Outgoing::Prompt { text, .. }
            | Outgoing::Edit { text, .. }
            | Outgoing::Notice { text, .. } => text,
        }
    }
}

/// In-memory channel for tests: records every outgoing message.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    sent: Arc<Mutex<Vec<Outgoing>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Outgoing> {
        self.sent.lock().expect("recording lock").clone()
    }

    /// Only the prompts (messages that offered reviewer actions).
    pub fn prompts(&self) -> Vec<Outgoing> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, Outgoing::Prompt { .. }))
            .collect()
    }

    /// Only the plain notices.
    pub fn notices(&self) -> Vec<Outgoing> {
        self.sent()
            .into_iter()
            .filter(|m| matches!(m, Outgoing::Notice { .. }))
            .collect()
    }

    fn record(&self, message: Outgoing) {
        self.sent.lock().expect("recording lock").push(message);
    }
}

#[async_trait]
impl ReviewChannel for RecordingChannel {
    async fn post_prompt(
        &self,
        job_id: Uuid,
        text: &str,
        actions: &[&str],
    ) -> Result<(), ChannelError> {
        self.record(Outgoing::Prompt {
            job_id,
            text: text.to_string(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
        });
        Ok(())
    }

    async fn edit_message(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError> {
        self.record(Outgoing::Edit {
            job_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn notify(&self, job_id: Uuid, text: &str) -> Result<(), ChannelError> {
        self.record(Outgoing::Notice {
            job_id,
            text: text.to_string(),
        });
        Ok(())
    }
}

/// Forwards queue transitions to the review channel.
///
/// Retries, failures, parkings and resumes become notices so a reviewer
/// sees every turn a job takes; the quieter lifecycle events (queued,
/// started, fan-in) stay in the event log only. Dispatch happens on the
/// worker's runtime, so the async notify is spawned fire-and-forget.
pub struct ChannelSink {
    channel: Arc<dyn ReviewChannel>,
}

impl ChannelSink {
    pub fn new(channel: Arc<dyn ReviewChannel>) -> Self {
        Self { channel }
    }

    fn describe(event: &QueueEvent) -> Option<String> {
        match event {
            QueueEvent::JobRetried {
                stage,
                error,
                attempts_made,
                max_attempts,
                ..
            } => Some(format!(
                "stage {} failed (attempt {}/{}): {} — retrying",
                stage, attempts_made, max_attempts, error
            )),
            QueueEvent::JobFailed { stage, error, .. } => Some(format!(
                "stage {} failed permanently: {} — re-submit manually once fixed",
                stage, error
            )),
            QueueEvent::JobDelayed { stage, wake_at, .. } => Some(format!(
                "stage {} suspended for review until {}",
                stage,
                wake_at.format("%Y-%m-%d %H:%M UTC")
            )),
            QueueEvent::JobResumed { stage, .. } => {
                Some(format!("stage {} resumed by reviewer action", stage))
            }
            _ => None,
        }
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &QueueEvent) -> Result<(), QueueError> {
        let Some(text) = Self::describe(event) else {
            return Ok(());
        };
        let channel = Arc::clone(&self.channel);
        let job_id = event.job_id();
        tokio::spawn(async move {
            if let Err(e) = channel.notify(job_id, &text).await {
                tracing::warn!(job_id = %job_id, error = %e, "channel notice failed");
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn recording_channel_captures_in_order() {
        let channel = RecordingChannel::new();
        let job_id = Uuid::new_v4();

        channel.notify(job_id, "saving scope 1+2").await.unwrap();
        channel
            .post_prompt(job_id, "scope1 100 -> 150", &["approve", "reject"])
            .await
            .unwrap();
        channel.edit_message(job_id, "saved").await.unwrap();

        let sent = channel.sent();
        assert_eq!(sent.len(), 3);
        assert!(matches!(sent[0], Outgoing::Notice { .. }));
        assert!(matches!(sent[1], Outgoing::Prompt { .. }));
        assert!(matches!(sent[2], Outgoing::Edit { .. }));
        assert_eq!(channel.prompts().len(), 1);
        assert_eq!(channel.notices().len(), 1);
    }

    #[tokio::test]
    async fn recorded_prompt_keeps_action_list() {
        let channel = RecordingChannel::new();
        let job_id = Uuid::new_v4();
        channel
            .post_prompt(job_id, "diff", &crate::action::PROMPT_ACTIONS)
            .await
            .unwrap();

        match &channel.prompts()[0] {
            Outgoing::Prompt { actions, .. } => {
                assert_eq!(actions, &["approve", "reject", "retry", "feedback"]);
            }
            other => panic!("expected prompt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn channel_sink_forwards_review_relevant_events() {
        let channel = RecordingChannel::new();
        let sink = ChannelSink::new(Arc::new(channel.clone()));

        let job_id = Uuid::new_v4();
        sink.send(&QueueEvent::JobDelayed {
            job_id,
            stage: "save_to_api".to_string(),
            wake_at: Utc::now(),
            timestamp: Utc::now(),
        })
        .unwrap();
        sink.send(&QueueEvent::JobFailed {
            job_id,
            stage: "save_to_api".to_string(),
            error: "backend unavailable".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();
        // Quiet lifecycle events produce no notice at all.
        sink.send(&QueueEvent::JobQueued {
            job_id,
            stage: "save_to_api".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();
        sink.send(&QueueEvent::JobStarted {
            job_id,
            stage: "save_to_api".to_string(),
            attempt: 1,
            timestamp: Utc::now(),
        })
        .unwrap();

        // The notifies are spawned; give them a tick to land.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let notices = channel.notices();
        assert_eq!(notices.len(), 2);
        assert!(notices
            .iter()
            .any(|n| n.text().contains("suspended for review")));
        assert!(notices
            .iter()
            .any(|n| n.text().contains("failed permanently")));
    }
}
