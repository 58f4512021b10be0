//! Fetch adapter: one remote call per batch, every failure turned into a value.

use std::sync::Arc;

use crate::error::FetchError;
use crate::types::{SourceId, SpectraTable};

use super::source::{FetchRequest, SpectrumSource};

/// Outcome of a single batch call
pub(crate) type BatchOutcome = std::result::Result<SpectraTable, FetchError>;

/// Invoke the source once for a batch.
///
/// Failures are returned as [`FetchError`]; nothing here can abort a run. The
/// dispatcher reports each one when it collects the level.
pub(crate) async fn fetch_batch(
    source: &dyn SpectrumSource,
    ids: &[SourceId],
    request: &FetchRequest,
) -> BatchOutcome {
    if ids.is_empty() {
        return Ok(SpectraTable::default());
    }

    match source.fetch(ids, request).await {
        Ok(table) => {
            tracing::debug!(
                batch_size = ids.len(),
                resolved = table.len(),
                "Batch fetched"
            );
            Ok(table)
        }
        Err(e) => {
            tracing::debug!(batch_size = ids.len(), error = %e, "Batch fetch failed");
            Err(e)
        }
    }
}

/// Run [`fetch_batch`] in its own task so a panicking source only loses its batch.
///
/// The task owns its identifiers and shares the immutable request; nothing else
/// crosses the task boundary.
pub(crate) async fn fetch_batch_isolated(
    source: Arc<dyn SpectrumSource>,
    ids: Vec<SourceId>,
    request: Arc<FetchRequest>,
) -> BatchOutcome {
    let batch_size = ids.len();
    let handle =
        tokio::spawn(async move { fetch_batch(source.as_ref(), &ids, request.as_ref()).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(batch_size, error = %e, "Batch fetch task panicked");
            Err(FetchError::Panicked(e.to_string()))
        }
    }
}
