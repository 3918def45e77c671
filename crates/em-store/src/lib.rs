//! # em-store
//!
//! Entity storage for Emissary. The pipeline's persistence stage talks to
//! one [`EntityStore`] trait; everything it writes is an upsert on a
//! natural key — companies by knowledge-base id, reporting periods by
//! `(company, end_date)`, value objects by their period — so a retried
//! save lands on the same rows instead of duplicating them. Goal and
//! initiative lists use replace-all semantics for the same reason.
//!
//! Two implementations ship:
//!
//! - [`MemoryStore`] — the reference store, used by tests and the
//!   default daemon configuration
//! - [`HttpStore`] — a client for the disclosure HTTP API

pub mod error;
pub mod http;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use store::{EntityStore, PeriodKey};
