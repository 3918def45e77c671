// events.rs — Queue events and notification dispatch.
//
// The table emits an event at every transition of interest: queued,
// started, completed, retried, delayed, resumed, failed, fan-in. Sinks
// fan these out to a JSONL log and to the review channel so that silence
// never stands in for success.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::Job;

/// Transitions the engine announces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum QueueEvent {
    JobQueued {
        job_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    JobStarted {
        job_id: Uuid,
        stage: String,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    JobCompleted {
        job_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// An attempt failed; the job re-queues once `next_attempt_at` passes.
    JobRetried {
        job_id: Uuid,
        stage: String,
        error: String,
        attempts_made: u32,
        max_attempts: u32,
        next_attempt_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// Parked (review gate or explicit delay) until woken.
    JobDelayed {
        job_id: Uuid,
        stage: String,
        wake_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// An external callback re-queued a parked job.
    JobResumed {
        job_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// Terminal failure.
    JobFailed {
        job_id: Uuid,
        stage: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Every child of a flow parent completed; the parent is queued.
    FlowFanInComplete {
        job_id: Uuid,
        stage: String,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Event type name as a string.
    pub fn event_type(&self) -> &str {
        match self {
            QueueEvent::JobQueued { .. } => "job_queued",
            QueueEvent::JobStarted { .. } => "job_started",
            QueueEvent::JobCompleted { .. } => "job_completed",
            QueueEvent::JobRetried { .. } => "job_retried",
            QueueEvent::JobDelayed { .. } => "job_delayed",
            QueueEvent::JobResumed { .. } => "job_resumed",
            QueueEvent::JobFailed { .. } => "job_failed",
            QueueEvent::FlowFanInComplete { .. } => "flow_fan_in_complete",
        }
    }

    /// The job the event is about.
    pub fn job_id(&self) -> Uuid {
        match *self {
            QueueEvent::JobQueued { job_id, .. }
            | QueueEvent::JobStarted { job_id, .. }
            | QueueEvent::JobCompleted { job_id, .. }
            | QueueEvent::JobRetried { job_id, .. }
            | QueueEvent::JobDelayed { job_id, .. }
            | QueueEvent::JobResumed { job_id, .. }
            | QueueEvent::JobFailed { job_id, .. }
            | QueueEvent::FlowFanInComplete { job_id, .. } => job_id,
        }
    }

    pub fn queued(job: &Job) -> Self {
        QueueEvent::JobQueued {
            job_id: job.id,
            stage: job.stage.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn started(job: &Job) -> Self {
        QueueEvent::JobStarted {
            job_id: job.id,
            stage: job.stage.clone(),
            attempt: job.attempts_made,
            timestamp: Utc::now(),
        }
    }

    pub fn completed(job: &Job) -> Self {
        QueueEvent::JobCompleted {
            job_id: job.id,
            stage: job.stage.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn retried(job: &Job, error: &str, next_attempt_at: DateTime<Utc>) -> Self {
        QueueEvent::JobRetried {
            job_id: job.id,
            stage: job.stage.clone(),
            error: error.to_string(),
            attempts_made: job.attempts_made,
            max_attempts: job.options.attempts,
            next_attempt_at,
            timestamp: Utc::now(),
        }
    }

    pub fn delayed(job: &Job, wake_at: DateTime<Utc>) -> Self {
        QueueEvent::JobDelayed {
            job_id: job.id,
            stage: job.stage.clone(),
            wake_at,
            timestamp: Utc::now(),
        }
    }

    pub fn resumed(job: &Job) -> Self {
        QueueEvent::JobResumed {
            job_id: job.id,
            stage: job.stage.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(job: &Job, error: &str) -> Self {
        QueueEvent::JobFailed {
            job_id: job.id,
            stage: job.stage.clone(),
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn fan_in_complete(job: &Job) -> Self {
        QueueEvent::FlowFanInComplete {
            job_id: job.id,
            stage: job.stage.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives queue events.
///
/// Implementations decide what to do with each event: append to a log
/// file, forward a notice to the review channel, collect for a test.
pub trait EventSink: Send + Sync {
    /// Handle an event. Errors are logged but never stop the engine.
    fn send(&self, event: &QueueEvent) -> Result<(), QueueError>;
}

/// Logs events as JSONL to a file (always-on sink).
pub struct LogSink {
    path: PathBuf,
}

impl LogSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl EventSink for LogSink {
    fn send(&self, event: &QueueEvent) -> Result<(), QueueError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| QueueError::Sink(format!("{}: {}", parent.display(), e)))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| QueueError::Sink(format!("{}: {}", self.path.display(), e)))?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json)
            .map_err(|e| QueueError::Sink(format!("{}: {}", self.path.display(), e)))?;

        Ok(())
    }
}

/// Dispatches events to multiple sinks.
///
/// Errors from individual sinks are logged (via tracing) but don't
/// prevent other sinks from receiving the event.
pub struct EventDispatcher {
    sinks: Vec<Box<dyn EventSink>>,
}

impl EventDispatcher {
    /// Create a new dispatcher with no sinks.
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add an event sink.
    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sinks.push(sink);
    }

    /// Dispatch an event to all sinks.
    pub fn dispatch(&self, event: &QueueEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("event sink error: {}", e);
            }
        }
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOptions;
    use serde_json::json;
    use tempfile::tempdir;

    fn test_job() -> Job {
        Job::new("extract", json!({}), JobOptions::default())
    }

    #[test]
    fn event_serialization_round_trip() {
        let event = QueueEvent::queued(&test_job());
        let json = serde_json::to_string(&event).unwrap();
        let restored: QueueEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(event.event_type(), restored.event_type());
        assert!(json.contains("\"job_queued\""));
    }

    #[test]
    fn log_sink_appends_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue-events.jsonl");
        let sink = LogSink::new(&path);

        sink.send(&QueueEvent::queued(&test_job())).unwrap();
        sink.send(&QueueEvent::completed(&test_job())).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn dispatcher_sends_to_all_sinks() {
        let dir = tempdir().unwrap();
        let path1 = dir.path().join("sink1.jsonl");
        let path2 = dir.path().join("sink2.jsonl");

        let mut dispatcher = EventDispatcher::new();
        dispatcher.add_sink(Box::new(LogSink::new(&path1)));
        dispatcher.add_sink(Box::new(LogSink::new(&path2)));

        dispatcher.dispatch(&QueueEvent::queued(&test_job()));

        assert!(fs::read_to_string(&path1).unwrap().contains("job_queued"));
        assert!(fs::read_to_string(&path2).unwrap().contains("job_queued"));
    }

    #[test]
    fn event_type_names() {
        let job = test_job();
        assert_eq!(QueueEvent::queued(&job).event_type(), "job_queued");
        assert_eq!(
            QueueEvent::retried(&job, "timeout", Utc::now()).event_type(),
            "job_retried"
        );
        assert_eq!(
            QueueEvent::fan_in_complete(&job).event_type(),
            "flow_fan_in_complete"
        );
    }
}
