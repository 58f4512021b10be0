//! Parallel dispatch: partition identifiers into granularity-aligned chunks and
//! fan them out over a bounded pool of fetch tasks.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::request_gate::RequestGate;
use crate::types::{Event, SourceId, SpectraTable};

use super::adapter::{BatchOutcome, fetch_batch_isolated};
use super::source::{FetchRequest, SpectrumSource};

/// Worker count left after reserving one unit of capacity for the controller.
pub fn reserved_worker_count(available: usize) -> usize {
    available.saturating_sub(1).max(1)
}

/// Per-worker chunk size rounded up to a multiple of `nearest`.
///
/// `nearest * ceil(floor(len / workers) / nearest)`: the identifiers are split
/// evenly across workers, then each share is rounded up so chunk boundaries
/// stay aligned to the retry granularity.
pub fn chunk_size(len: usize, nearest: usize, workers: usize) -> usize {
    let nearest = nearest.max(1);
    let share = len / workers.max(1);
    nearest * share.div_ceil(nearest)
}

/// How a level's identifiers will be sent
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchPlan {
    /// One call per identifier, one after another, staggered by the gate
    Sequential(Vec<SourceId>),
    /// Contiguous chunks fanned out over the pool
    Pooled {
        /// Chunk size in effect
        chunk_size: usize,
        /// The chunks, in input order
        chunks: Vec<Vec<SourceId>>,
    },
}

impl DispatchPlan {
    /// Decide between sequential and pooled dispatch
    pub fn new(ids: &[SourceId], nearest: usize, workers: usize) -> Self {
        let size = chunk_size(ids.len(), nearest, workers);
        if size < workers.max(1) {
            return Self::Sequential(ids.to_vec());
        }
        Self::Pooled {
            chunk_size: size,
            chunks: ids.chunks(size).map(<[SourceId]>::to_vec).collect(),
        }
    }

    /// Number of remote calls the plan will make
    pub fn call_count(&self) -> usize {
        match self {
            Self::Sequential(ids) => ids.len(),
            Self::Pooled { chunks, .. } => chunks.len(),
        }
    }
}

/// Fans batch calls out for one retry level.
///
/// Created once per run; each [`Dispatcher::dispatch`] call builds its own pool
/// (a bounded `buffer_unordered` stream) and waits for every batch before returning.
pub struct Dispatcher {
    source: Arc<dyn SpectrumSource>,
    request: Arc<FetchRequest>,
    workers: usize,
    pool_size: usize,
    event_tx: tokio::sync::broadcast::Sender<Event>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        source: Arc<dyn SpectrumSource>,
        request: Arc<FetchRequest>,
        workers: usize,
        pool_size: usize,
        event_tx: tokio::sync::broadcast::Sender<Event>,
    ) -> Self {
        Self {
            source,
            request,
            workers: workers.max(1),
            pool_size: pool_size.max(1),
            event_tx,
        }
    }

    /// Worker count used for chunk sizing
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetch `ids` at granularity `nearest`.
    ///
    /// Returns the concatenation of every successful batch, or `None` when no
    /// batch succeeded at all. An empty table means some batch succeeded but
    /// resolved nothing.
    pub async fn dispatch(
        &self,
        ids: &[SourceId],
        nearest: usize,
        gate: &RequestGate,
    ) -> Option<SpectraTable> {
        if ids.is_empty() {
            return None;
        }

        let plan = DispatchPlan::new(ids, nearest, self.workers);
        let outcomes = match plan {
            DispatchPlan::Sequential(ids) => {
                tracing::info!(
                    granularity = nearest,
                    calls = ids.len(),
                    "Dispatching identifiers one at a time"
                );
                self.run_sequential(ids, gate).await
            }
            DispatchPlan::Pooled { chunk_size, chunks } => {
                tracing::info!(
                    granularity = nearest,
                    chunk_size,
                    chunks = chunks.len(),
                    pool_size = self.pool_size,
                    "Dispatching chunks to worker pool"
                );
                self.run_pooled(chunks).await
            }
        };

        self.collect(outcomes, nearest)
    }

    async fn run_sequential(
        &self,
        ids: Vec<SourceId>,
        gate: &RequestGate,
    ) -> Vec<(usize, BatchOutcome)> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for (index, id) in ids.into_iter().enumerate() {
            gate.wait_turn(index).await;
            let outcome = fetch_batch_isolated(
                Arc::clone(&self.source),
                vec![id],
                Arc::clone(&self.request),
            )
            .await;
            outcomes.push((1, outcome));
        }
        outcomes
    }

    async fn run_pooled(&self, chunks: Vec<Vec<SourceId>>) -> Vec<(usize, BatchOutcome)> {
        stream::iter(chunks)
            .map(|chunk| {
                let source = Arc::clone(&self.source);
                let request = Arc::clone(&self.request);
                async move {
                    let batch_size = chunk.len();
                    (batch_size, fetch_batch_isolated(source, chunk, request).await)
                }
            })
            .buffer_unordered(self.pool_size)
            .collect()
            .await
    }

    fn collect(
        &self,
        outcomes: Vec<(usize, BatchOutcome)>,
        granularity: usize,
    ) -> Option<SpectraTable> {
        let mut tables = Vec::with_capacity(outcomes.len());
        let mut failed = 0usize;

        for (batch_size, outcome) in outcomes {
            match outcome {
                Ok(table) => tables.push(table),
                Err(e) => {
                    failed += 1;
                    if e.is_transient() {
                        tracing::info!(
                            granularity,
                            batch_size,
                            error = %e,
                            "Batch failed, identifiers carried forward"
                        );
                    } else {
                        tracing::warn!(
                            granularity,
                            batch_size,
                            error = %e,
                            "Batch rejected, identifiers carried forward"
                        );
                    }
                    self.event_tx
                        .send(Event::BatchFailed {
                            granularity,
                            batch_size,
                            error: e.to_string(),
                        })
                        .ok();
                }
            }
        }

        if tables.is_empty() {
            tracing::warn!(granularity, failed, "Every batch failed at this granularity");
            return None;
        }
        if failed > 0 {
            tracing::info!(
                granularity,
                failed,
                succeeded = tables.len(),
                "Some batches failed"
            );
        }
        Some(SpectraTable::concat(tables))
    }
}
