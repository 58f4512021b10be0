//! Batched spectrum retrieval split into focused submodules.
//!
//! The [`XpRetriever`] drives a run end to end:
//! - [`source`] - Remote fetch capability and its HTTP implementation
//! - `adapter` - One isolated call per batch, failures captured as values
//! - [`dispatch`] - Granularity-aligned chunking over a bounded task pool
//! - [`merge`] - Accumulation of resolved spectra and the final left join
//! - [`cascade`] - Straggler re-dispatch at successively finer granularities

mod adapter;
pub mod cascade;
pub mod dispatch;
pub mod merge;
pub mod source;


pub use cascade::{CascadeOutcome, LevelReport};
pub use dispatch::{DispatchPlan, Dispatcher, chunk_size, reserved_worker_count};
pub use merge::{MergedTable, ResultMerger};
pub use source::{Credentials, FetchRequest, HttpSpectrumSource, SpectrumSource};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{self, OutputPaths, SaveSummary};
use crate::table::InputTable;
use crate::types::Event;

/// Result of a complete file-to-file run
#[derive(Clone, Debug)]
pub struct BatchSummary {
    /// Input file that was processed
    pub input: PathBuf,
    /// Distinct identifiers requested
    pub requested: usize,
    /// Distinct identifiers resolved
    pub resolved: usize,
    /// Per-level progress
    pub levels: Vec<LevelReport>,
    /// Files written
    pub saved: SaveSummary,
}

/// Adaptive batched retriever for XP spectra
///
/// Cloning is cheap; clones share the source and the event channel.
#[derive(Clone)]
pub struct XpRetriever {
    config: Arc<Config>,
    source: Arc<dyn SpectrumSource>,
    request: Arc<FetchRequest>,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl XpRetriever {
    /// Create a retriever talking to the configured HTTP endpoint
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpSpectrumSource::from_config(&config.fetch)?;
        Self::with_source(config, Arc::new(source))
    }

    /// Create a retriever over any [`SpectrumSource`]
    pub fn with_source(config: Config, source: Arc<dyn SpectrumSource>) -> Result<Self> {
        config.validate()?;
        let request = FetchRequest::from_config(&config.fetch)?;

        // Slow subscribers lag rather than block retrieval
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            source,
            request: Arc::new(request),
            event_tx,
        })
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retrieve spectra for every identifier in `input`.
    ///
    /// Partial coverage is a success; only a first level that resolves nothing
    /// is an error.
    pub async fn retrieve(&self, input: Arc<InputTable>) -> Result<CascadeOutcome> {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.source),
            Arc::clone(&self.request),
            self.config.dispatch.worker_count(),
            self.config.dispatch.pool_size(),
            self.event_tx.clone(),
        );

        tracing::info!(
            rows = input.len(),
            workers = dispatcher.workers(),
            granularities = ?self.config.retry.granularities,
            "Starting XP spectra retrieval"
        );

        cascade::run_cascade(
            &dispatcher,
            &self.config.retry.granularities,
            self.config.dispatch.stagger,
            input,
            &self.event_tx,
        )
        .await
    }

    /// Read a CSV file, retrieve its spectra and write every output next to it
    pub async fn run_batch(&self, input_path: &Path) -> Result<BatchSummary> {
        // Reject bad paths before any remote call
        OutputPaths::for_input(input_path, &self.config.export.spectra_dir)?;

        let path = input_path.to_path_buf();
        let id_column = self.config.input.id_column.clone();
        let input = tokio::task::spawn_blocking(move || InputTable::from_path(&path, &id_column))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        tracing::info!(
            file = %input_path.display(),
            rows = input.len(),
            "Loaded input table"
        );

        let outcome = self.retrieve(Arc::new(input)).await?;
        let requested = outcome
            .levels
            .first()
            .map(|l| l.resolved_total + l.stragglers)
            .unwrap_or_default();
        let resolved = requested - outcome.unresolved();

        let config = Arc::clone(&self.config);
        let path = input_path.to_path_buf();
        let merged = outcome.merged;
        let saved = tokio::task::spawn_blocking(move || export::save(&merged, &path, &config))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        Ok(BatchSummary {
            input: input_path.to_path_buf(),
            requested,
            resolved,
            levels: outcome.levels,
            saved,
        })
    }
}
