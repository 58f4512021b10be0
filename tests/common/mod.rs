//! Common test utilities for gaia-xp-dl integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use gaia_xp_dl::{
    Config, FetchError, FetchRequest, SourceId, SpectraTable, SpectrumRow, SpectrumSource,
    StaggerPolicy,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Grid length the service uses when no sampling is requested
pub const DEFAULT_GRID_LEN: usize = 433;

/// In-memory archive that resolves every identifier except `missing`
#[derive(Default)]
pub struct FakeArchive {
    /// Identifiers the archive has no spectrum for
    pub missing: HashSet<i64>,
    /// Fail every call with a 503
    pub unavailable: bool,
    /// Batches seen so far
    pub calls: Mutex<Vec<usize>>,
}

impl FakeArchive {
    pub fn missing(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            missing: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

/// Deterministic spectrum for an identifier on a grid of `len` points
pub fn synthetic_row(id: SourceId, len: usize) -> SpectrumRow {
    let base = id.get() as f64;
    SpectrumRow {
        source_id: id,
        flux: (0..len).map(|i| base + i as f64).collect(),
        flux_error: (0..len).map(|i| (i as f64 + 1.0) / 100.0).collect(),
    }
}

#[async_trait]
impl SpectrumSource for FakeArchive {
    async fn fetch(
        &self,
        ids: &[SourceId],
        request: &FetchRequest,
    ) -> Result<SpectraTable, FetchError> {
        self.calls.lock().unwrap().push(ids.len());
        if self.unavailable {
            return Err(FetchError::Status {
                status: 503,
                body: "archive down".into(),
            });
        }

        let len = request
            .sampling
            .as_ref()
            .map_or(DEFAULT_GRID_LEN, Vec::len);
        let rows = ids
            .iter()
            .copied()
            .filter(|id| !self.missing.contains(&id.get()))
            .map(|id| synthetic_row(id, len))
            .collect();
        Ok(SpectraTable::new(rows))
    }
}

/// Configuration with no stagger delay and a small fixed pool
pub fn fast_config() -> Config {
    let mut config = Config::default();
    config.dispatch.workers = Some(2);
    config.dispatch.pool_size = Some(2);
    config.dispatch.stagger = StaggerPolicy::Gated {
        delay: Duration::ZERO,
    };
    config
}

/// Write a `shortname,source_id,ra` table with `count` rows starting at `first_id`
pub fn write_targets(dir: &Path, file_name: &str, first_id: i64, count: i64) -> PathBuf {
    let mut text = String::from("shortname,source_id,ra\n");
    for i in 0..count {
        let id = first_id + i;
        text.push_str(&format!("star{i},{id},{}.5\n", i * 3));
    }
    let path = dir.join(file_name);
    std::fs::write(&path, text).unwrap();
    path
}

/// Read a CSV file as raw records, header included
pub fn read_records(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
