//! # em-daemon
//!
//! The Emissary pipeline daemon.
//!
//! Starts the job engine with the six pipeline stages registered, wires
//! the review channel and the reviewer-action dispatcher, and runs until
//! interrupted. Report URLs can be queued at start-up with `--submit`;
//! reviewer actions are typed on stdin (see `terminal.rs`) or delivered
//! by whatever channel adapter replaces it.
//!
//! ## Usage
//!
//! ```text
//! em-daemon --config emissary.toml --submit https://example.com/report.pdf
//! ```
//!
//! With no config file the daemon runs self-contained: in-memory entity
//! store, review prompts in the log, no search index (reports come back
//! without passages).

mod backends;
mod config;
mod terminal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use em_pipeline::stages::{
    COMPANY_LOOKUP, EXTRACT_EMISSIONS, FISCAL_YEAR, INGEST, PRECHECK, SAVE_TO_API,
};
use em_pipeline::{
    CompanyLookupStage, DocumentSearch, ExtractEmissionsStage, FiscalYearStage, IngestStage,
    PrecheckStage, ProposalReviser, SaveToApiStage, StaticSearch,
};
use em_queue::{
    Engine, EngineHandle, EventDispatcher, JobOptions, JobTable, LogSink, StageOptions,
};
use em_review::{
    ChannelSink, CompletionBackend, DiffSynthesizer, GateDispatcher, LogChannel, PendingReviews,
    ReviewChannel, ReviewGate,
};
use em_store::{EntityStore, HttpStore, MemoryStore};

use crate::backends::{HttpCompletion, HttpSearch};
use crate::config::{DaemonConfig, StoreConfig};

/// Emissary pipeline daemon.
#[derive(Parser)]
#[command(name = "em-daemon", about = "Emissary disclosure pipeline daemon")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Report URLs to queue for ingestion at start-up.
    #[arg(long = "submit")]
    submit: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays free for reviewer actions.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("em_daemon=info".parse()?)
                .add_directive("em_queue=info".parse()?)
                .add_directive("em_review=info".parse()?)
                .add_directive("em_pipeline=info".parse()?)
                .add_directive("em_store=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };

    let handle = start(&config).await?;
    for url in &cli.submit {
        let id = handle.submit(INGEST, json!({ "url": url }), JobOptions::default())?;
        tracing::info!(%id, url, "report queued");
    }

    tracing::info!("daemon running; reviewer actions on stdin, Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;

    tracing::info!("shutting down, letting claimed jobs finish");
    handle.shutdown().await;
    Ok(())
}

/// Build the collaborators, register the stages and spawn the engine,
/// the action dispatcher and the terminal reader.
async fn start(config: &DaemonConfig) -> Result<EngineHandle> {
    let channel: Arc<dyn ReviewChannel> = Arc::new(LogChannel);

    let mut events = EventDispatcher::new();
    if let Some(path) = &config.events_log {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        events.add_sink(Box::new(LogSink::new(path)));
    }
    events.add_sink(Box::new(ChannelSink::new(Arc::clone(&channel))));
    let table = Arc::new(JobTable::new(Arc::new(events)));

    let store: Arc<dyn EntityStore> = match &config.store {
        StoreConfig::Memory => {
            tracing::warn!("in-memory entity store: disclosure data is lost on shutdown");
            Arc::new(MemoryStore::new())
        }
        StoreConfig::Http { base_url, token } => {
            let mut http = HttpStore::new(base_url).context("building the entity-store client")?;
            if let Some(token) = token {
                http = http.with_token(token);
            }
            Arc::new(http)
        }
    };

    let backend: Arc<dyn CompletionBackend> = Arc::new(
        HttpCompletion::new(&config.completion).context("building the completion client")?,
    );
    let search: Arc<dyn DocumentSearch> =
        match HttpSearch::new(&config.search).context("building the search client")? {
            Some(http) => Arc::new(http),
            None => {
                tracing::warn!("no search index configured: reports will yield no passages");
                Arc::new(StaticSearch::empty())
            }
        };

    let pending = PendingReviews::new();
    let gate = ReviewGate::new(
        DiffSynthesizer::new(Arc::clone(&backend)),
        Arc::clone(&channel),
    );
    let reviser = ProposalReviser::new(Arc::clone(&backend));

    let mut engine = Engine::new(Arc::clone(&table))
        .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
    let stages = &config.stages;
    engine.register(
        INGEST,
        Arc::new(IngestStage::new(
            Arc::clone(&table),
            search,
            Arc::clone(&channel),
        )),
        StageOptions::concurrent(stages.ingest),
    );
    engine.register(
        PRECHECK,
        Arc::new(PrecheckStage::new(
            Arc::clone(&table),
            Arc::clone(&backend),
            Arc::clone(&channel),
        )),
        StageOptions::concurrent(stages.precheck),
    );
    engine.register(
        COMPANY_LOOKUP,
        Arc::new(CompanyLookupStage::new(Arc::clone(&backend))),
        StageOptions::concurrent(stages.company_lookup),
    );
    engine.register(
        FISCAL_YEAR,
        Arc::new(FiscalYearStage::new(Arc::clone(&backend))),
        StageOptions::concurrent(stages.fiscal_year),
    );
    engine.register(
        EXTRACT_EMISSIONS,
        Arc::new(ExtractEmissionsStage::new(
            Arc::clone(&table),
            Arc::clone(&backend),
        )),
        StageOptions::concurrent(stages.extract_emissions),
    );
    engine.register(
        SAVE_TO_API,
        Arc::new(SaveToApiStage::new(
            Arc::clone(&table),
            store,
            gate,
            reviser,
            pending.clone(),
            Arc::clone(&channel),
        )),
        StageOptions::concurrent(stages.save_to_api),
    );
    let handle = engine.start();

    let (actions_tx, actions_rx) = mpsc::channel(64);
    let dispatcher = GateDispatcher::new(Arc::clone(&table), pending, channel);
    tokio::spawn(async move { dispatcher.run(actions_rx).await });
    tokio::spawn(terminal::read_actions(actions_tx, config.reviewer.clone()));

    Ok(handle)
}
