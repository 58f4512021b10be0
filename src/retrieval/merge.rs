//! Result merging: accumulate batch results and left-join them onto the input table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::table::InputTable;
use crate::types::{SourceId, SpectraTable, SpectrumRow};

/// Running union of every resolved spectrum, keyed on the configured join column.
///
/// Only identifiers present in the input are kept and the first row seen for an
/// identifier wins, so the accumulated set only ever grows and absorbing the same
/// result twice changes nothing.
pub struct ResultMerger {
    input: Arc<InputTable>,
    universe: HashSet<SourceId>,
    accumulated: HashMap<SourceId, SpectrumRow>,
}

impl ResultMerger {
    /// Start with an empty accumulated table
    pub fn new(input: Arc<InputTable>) -> Self {
        let universe = input.ids().iter().copied().collect();
        Self {
            input,
            universe,
            accumulated: HashMap::new(),
        }
    }

    /// Fold a level's result into the accumulated table.
    ///
    /// `None` ("no batch succeeded") is a no-op. Returns how many identifiers
    /// were newly resolved.
    pub fn absorb(&mut self, result: Option<SpectraTable>) -> usize {
        let Some(table) = result else {
            return 0;
        };

        let mut added = 0;
        let mut foreign = 0;
        for row in table.into_rows() {
            if !self.universe.contains(&row.source_id) {
                foreign += 1;
                continue;
            }
            if let std::collections::hash_map::Entry::Vacant(slot) =
                self.accumulated.entry(row.source_id)
            {
                slot.insert(row);
                added += 1;
            }
        }

        if foreign > 0 {
            tracing::debug!(foreign, "Ignored rows for identifiers not in the input");
        }
        added
    }

    /// Number of distinct identifiers with a spectrum
    pub fn resolved_count(&self) -> usize {
        self.accumulated.len()
    }

    /// Number of distinct identifiers in the input
    pub fn total(&self) -> usize {
        self.universe.len()
    }

    /// True if the identifier already has a spectrum
    pub fn is_resolved(&self, id: SourceId) -> bool {
        self.accumulated.contains_key(&id)
    }

    /// Identifiers that have a spectrum
    pub fn resolved_ids(&self) -> HashSet<SourceId> {
        self.accumulated.keys().copied().collect()
    }

    /// Distinct input identifiers still lacking a spectrum, in input order
    pub fn stragglers(&self) -> Vec<SourceId> {
        self.input
            .distinct_ids()
            .into_iter()
            .filter(|id| !self.accumulated.contains_key(id))
            .collect()
    }

    /// Left join of the input table against the accumulated spectra
    pub fn merged(&self) -> MergedTable {
        let spectra = self
            .input
            .ids()
            .iter()
            .map(|id| self.accumulated.get(id).cloned())
            .collect();
        MergedTable {
            input: Arc::clone(&self.input),
            spectra,
        }
    }
}

/// Every input row, each paired with its spectrum if one was resolved
#[derive(Clone, Debug, PartialEq)]
pub struct MergedTable {
    input: Arc<InputTable>,
    spectra: Vec<Option<SpectrumRow>>,
}

impl MergedTable {
    /// The input side of the join
    pub fn input(&self) -> &InputTable {
        &self.input
    }

    /// Spectrum for a row, None if unresolved
    pub fn spectrum(&self, row: usize) -> Option<&SpectrumRow> {
        self.spectra.get(row).and_then(Option::as_ref)
    }

    /// Number of rows, always equal to the input row count
    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    /// True if the input had no rows
    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }

    /// Rows with a spectrum
    pub fn resolved_rows(&self) -> usize {
        self.spectra.iter().filter(|s| s.is_some()).count()
    }

    /// Rows without a spectrum
    pub fn unresolved_rows(&self) -> usize {
        self.len() - self.resolved_rows()
    }

    /// Iterate the resolved rows as `(row_index, spectrum)`
    pub fn covered(&self) -> impl Iterator<Item = (usize, &SpectrumRow)> {
        self.spectra
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i, s)))
    }
}
