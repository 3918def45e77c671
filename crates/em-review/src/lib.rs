//! # em-review
//!
//! The human review gate in front of every disclosure write.
//!
//! A persistence stage never commits a changed record on its own: it
//! builds a [`Proposal`] from the existing and proposed slices, asks the
//! [`ReviewGate`] to evaluate it, and — when the change is material —
//! parks its job until a reviewer acts. Reviewer actions arrive as
//! [`ActionEnvelope`]s from whatever channel adapter is wired in and are
//! applied by the [`GateDispatcher`], which guarantees at-most-one resume
//! per parked job.
//!
//! ## Key components
//!
//! - [`ReviewChannel`] — outbound contract: prompts, edits, notices
//! - [`DiffSynthesizer`] — turns a before/after pair into a reviewer-
//!   readable summary, or the no-material-change sentinel
//! - [`ReviewGate`] — the gate protocol: first-write bypass, no-change
//!   commit, suspend-with-prompt
//! - [`GateDispatcher`] / [`PendingReviews`] — callback handling and the
//!   parked-job registry that powers the `retry` action

pub mod action;
pub mod channel;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod proposal;

pub use action::{ActionEnvelope, ReviewAction, PROMPT_ACTIONS};
pub use channel::{ChannelError, ChannelSink, LogChannel, Outgoing, RecordingChannel, ReviewChannel};
pub use diff::{CompletionBackend, CompletionError, DiffSummary, DiffSynthesizer, NO_CHANGES};
pub use dispatch::{GateDispatcher, PendingReviews, ReviewOrigin};
pub use error::ReviewError;
pub use gate::{GateDecision, ReviewGate};
pub use proposal::Proposal;
