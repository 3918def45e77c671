// config.rs — Daemon configuration.
//
// One TOML file decides where the daemon gets its collaborators: which
// entity store backs the persistence stage, which completion service
// answers the extraction asks, which index serves report passages, and
// how wide each worker pool runs. Every field has a default that works
// with no file at all: in-memory store, no search index, prompts in the
// log, and the observed stage concurrencies.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level daemon configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// JSONL file every queue transition is appended to, alongside the
    /// review-channel notices. Absent means no event log on disk.
    pub events_log: Option<PathBuf>,

    /// Reviewer identity recorded on terminal actions.
    #[serde(default = "default_reviewer")]
    pub reviewer: String,

    /// How often idle workers and the wake scheduler re-check the table.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub stages: StageConcurrency,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            events_log: None,
            reviewer: default_reviewer(),
            poll_interval_ms: default_poll_interval_ms(),
            store: StoreConfig::default(),
            completion: CompletionConfig::default(),
            search: SearchConfig::default(),
            stages: StageConcurrency::default(),
        }
    }
}

/// Which [`em_store::EntityStore`] implementation the save stage writes
/// through.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields, rename_all = "snake_case", tag = "kind")]
pub enum StoreConfig {
    /// In-memory reference store; state is lost on shutdown.
    #[default]
    Memory,

    /// The disclosure HTTP API.
    Http {
        base_url: String,
        token: Option<String>,
    },
}

/// The completion service behind extraction asks and diff summaries.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    pub base_url: String,
    pub token: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
        }
    }
}

/// The vector index the ingest stage queries for report passages.
/// Absent `base_url` means no index is wired in: every report comes back
/// empty and the pipeline ends at ingest with a notice.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SearchConfig {
    pub base_url: Option<String>,
}

/// Worker slots per stage. Ingestion is single-shot; the completion-bound
/// and persistence stages default to ten slots each.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConcurrency {
    #[serde(default = "one")]
    pub ingest: usize,
    #[serde(default = "ten")]
    pub precheck: usize,
    #[serde(default = "ten")]
    pub company_lookup: usize,
    #[serde(default = "ten")]
    pub fiscal_year: usize,
    #[serde(default = "ten")]
    pub extract_emissions: usize,
    #[serde(default = "ten")]
    pub save_to_api: usize,
}

impl Default for StageConcurrency {
    fn default() -> Self {
        Self {
            ingest: 1,
            precheck: 10,
            company_lookup: 10,
            fiscal_year: 10,
            extract_emissions: 10,
            save_to_api: 10,
        }
    }
}

fn default_reviewer() -> String {
    "terminal".to_string()
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn one() -> usize {
    1
}

fn ten() -> usize {
    10
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
