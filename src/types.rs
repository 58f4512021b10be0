//! Core types and events for gaia-xp-dl

use serde::{Deserialize, Serialize};

/// Unique identifier of a requestable catalog object (Gaia DR3 `source_id`)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(pub i64);

impl SourceId {
    /// Create a new SourceId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for SourceId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<SourceId> for i64 {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

impl PartialEq<i64> for SourceId {
    fn eq(&self, other: &i64) -> bool {
        self.0 == *other
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SourceId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// One calibrated spectrum as returned by the remote service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRow {
    /// Object the spectrum belongs to
    pub source_id: SourceId,
    /// Calibrated flux, one value per wavelength sample
    pub flux: Vec<f64>,
    /// Flux uncertainty, one value per wavelength sample
    pub flux_error: Vec<f64>,
}

/// Rows resolved by one or more batch calls
///
/// A batch of N identifiers may produce anywhere from 0 to N rows; the table
/// makes no claim about which identifiers are missing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpectraTable {
    rows: Vec<SpectrumRow>,
}

impl SpectraTable {
    /// Wrap a set of rows
    pub fn new(rows: Vec<SpectrumRow>) -> Self {
        Self { rows }
    }

    /// Row-wise concatenation of several tables
    pub fn concat(tables: impl IntoIterator<Item = SpectraTable>) -> Self {
        let rows = tables.into_iter().flat_map(|t| t.rows).collect();
        Self { rows }
    }

    /// Borrow the rows
    pub fn rows(&self) -> &[SpectrumRow] {
        &self.rows
    }

    /// Take ownership of the rows
    pub fn into_rows(self) -> Vec<SpectrumRow> {
        self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no row was resolved
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Progress event emitted while a batch run is in flight
///
/// Subscribe through [`crate::XpRetriever::subscribe`]. Events are advisory;
/// a lagging subscriber misses events but never blocks retrieval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A retry level is about to dispatch its stragglers
    LevelStarted {
        /// Zero-based level index
        level: usize,
        /// Target batch granularity for this level
        granularity: usize,
        /// Number of identifiers dispatched at this level
        pending: usize,
    },

    /// A retry level was skipped because too few stragglers remained
    LevelSkipped {
        /// Zero-based level index
        level: usize,
        /// Granularity that was not used
        granularity: usize,
        /// Stragglers carried forward unchanged
        stragglers: usize,
    },

    /// A single batch call produced nothing
    BatchFailed {
        /// Granularity of the level the batch belonged to
        granularity: usize,
        /// Number of identifiers in the batch
        batch_size: usize,
        /// Failure reason
        error: String,
    },

    /// A retry level finished and its results were merged
    LevelCompleted {
        /// Zero-based level index
        level: usize,
        /// Granularity used
        granularity: usize,
        /// Identifiers resolved by this level
        resolved: usize,
        /// Identifiers still missing after this level
        stragglers: usize,
    },

    /// The cascade terminated
    Completed {
        /// Distinct identifiers in the input
        total: usize,
        /// Identifiers with a spectrum
        resolved: usize,
        /// Identifiers accepted as permanently unresolved
        unresolved: usize,
    },
}
