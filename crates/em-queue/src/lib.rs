//! # em-queue
//!
//! The job and flow engine underneath the Emissary pipeline.
//!
//! Jobs live in a shared in-memory table, move through a guarded state
//! machine (`queued → active → completed / failed-retry / delayed /
//! waiting-children`), and are executed by per-stage tokio worker pools.
//! Flows give a parent job a fan-in barrier over N children: the parent
//! runs only after every child completes, with the child results merged
//! into its payload keyed by child stage name.
//!
//! ## Key components
//!
//! - [`Job`] / [`JobState`] — the job record and its state machine
//! - [`JobTable`] — the mutex-guarded arena all workers share
//! - [`StageHandler`] — the async trait a pipeline stage implements
//! - [`Engine`] — registers stages and spawns worker pools plus the
//!   wake scheduler for delayed and retrying jobs
//! - [`QueueEvent`] / [`EventSink`] — transition notifications; every
//!   transition of interest is observable, silence never means success

pub mod engine;
pub mod error;
pub mod events;
pub mod handler;
pub mod job;
pub mod merge;
pub mod table;

pub use engine::{Engine, EngineHandle, StageOptions};
pub use error::{QueueError, StageError};
pub use events::{EventDispatcher, EventSink, LogSink, QueueEvent};
pub use handler::{JobContext, StageHandler, StageOutcome};
pub use job::{BackoffPolicy, Job, JobOptions, JobState};
pub use merge::deep_merge;
pub use table::{FlowHandle, JobTable, ResumeOutcome};
