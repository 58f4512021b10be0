//! Cascading retry: re-dispatch stragglers at successively finer granularities.

use std::sync::Arc;

use serde::Serialize;

use crate::config::StaggerPolicy;
use crate::error::{Error, Result};
use crate::request_gate::RequestGate;
use crate::table::InputTable;
use crate::types::Event;

use super::dispatch::Dispatcher;
use super::merge::{MergedTable, ResultMerger};

/// What happened at one level of the cascade
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelReport {
    /// Zero-based level index
    pub level: usize,
    /// Granularity of the level
    pub granularity: usize,
    /// Identifiers sent at this level (0 when skipped)
    pub dispatched: usize,
    /// Identifiers resolved by this level
    pub newly_resolved: usize,
    /// Distinct identifiers resolved after this level
    pub resolved_total: usize,
    /// Distinct identifiers still missing after this level
    pub stragglers: usize,
    /// True if the level did not run because too few stragglers remained
    pub skipped: bool,
}

/// Final state of a cascade run
#[derive(Clone, Debug)]
pub struct CascadeOutcome {
    /// Full left join of input and resolved spectra
    pub merged: MergedTable,
    /// One entry per level that was reached
    pub levels: Vec<LevelReport>,
}

impl CascadeOutcome {
    /// Distinct identifiers left unresolved after the last level
    pub fn unresolved(&self) -> usize {
        self.levels.last().map(|l| l.stragglers).unwrap_or_default()
    }
}

/// Whether level `level` should dispatch `stragglers` identifiers.
///
/// The first and last levels always run when anything is outstanding. An
/// intermediate level only runs while the stragglers outnumber the previous
/// level's granularity; below that, the finer level would gain nothing.
pub(crate) fn should_run(levels: &[usize], level: usize, stragglers: usize) -> bool {
    if stragglers == 0 {
        return false;
    }
    if level == 0 || level + 1 >= levels.len() {
        return true;
    }
    stragglers > levels[level - 1]
}

/// Drive the dispatcher through every granularity level.
///
/// Fails with [`Error::AllBatchesFailed`] only when the first level resolves
/// nothing at all. Identifiers still unresolved after the finest level are
/// accepted and appear as null rows in the merged table.
pub(crate) async fn run_cascade(
    dispatcher: &Dispatcher,
    levels: &[usize],
    stagger: StaggerPolicy,
    input: Arc<InputTable>,
    event_tx: &tokio::sync::broadcast::Sender<Event>,
) -> Result<CascadeOutcome> {
    if input.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut merger = ResultMerger::new(input);
    let total = merger.total();
    let mut stragglers = merger.stragglers();
    let mut reports = Vec::with_capacity(levels.len());

    for (level, &granularity) in levels.iter().enumerate() {
        if stragglers.is_empty() {
            break;
        }

        if !should_run(levels, level, stragglers.len()) {
            tracing::info!(
                level,
                granularity,
                stragglers = stragglers.len(),
                "Skipping level, stragglers carried forward"
            );
            event_tx
                .send(Event::LevelSkipped {
                    level,
                    granularity,
                    stragglers: stragglers.len(),
                })
                .ok();
            reports.push(LevelReport {
                level,
                granularity,
                dispatched: 0,
                newly_resolved: 0,
                resolved_total: merger.resolved_count(),
                stragglers: stragglers.len(),
                skipped: true,
            });
            continue;
        }

        let pending = stragglers.len();
        tracing::info!(level, granularity, pending, "Starting retrieval level");
        event_tx
            .send(Event::LevelStarted {
                level,
                granularity,
                pending,
            })
            .ok();

        // Gate lives for this level only
        let gate = RequestGate::new(stagger);
        let result = dispatcher.dispatch(&stragglers, granularity, &gate).await;
        let newly_resolved = merger.absorb(result);

        if level == 0 && merger.resolved_count() == 0 {
            tracing::error!(requested = total, "First level resolved no identifiers");
            return Err(Error::AllBatchesFailed { requested: total });
        }

        stragglers = merger.stragglers();
        tracing::info!(
            level,
            granularity,
            resolved = newly_resolved,
            stragglers = stragglers.len(),
            "Retrieval level complete"
        );
        event_tx
            .send(Event::LevelCompleted {
                level,
                granularity,
                resolved: newly_resolved,
                stragglers: stragglers.len(),
            })
            .ok();
        reports.push(LevelReport {
            level,
            granularity,
            dispatched: pending,
            newly_resolved,
            resolved_total: merger.resolved_count(),
            stragglers: stragglers.len(),
            skipped: false,
        });
    }

    let resolved = merger.resolved_count();
    if !stragglers.is_empty() {
        tracing::info!(
            unresolved = stragglers.len(),
            "Identifiers left unresolved after the finest granularity"
        );
    }
    event_tx
        .send(Event::Completed {
            total,
            resolved,
            unresolved: stragglers.len(),
        })
        .ok();

    Ok(CascadeOutcome {
        merged: merger.merged(),
        levels: reports,
    })
}
