//! Export of merged results
//!
//! A run always produces two tables next to the input file:
//! - `<stem>_XP_spectra.csv`: every input row, spectrum cells empty where unresolved
//! - `<stem>_XP_spectra_cut.csv`: only rows with a spectrum
//!
//! With an [`ExportStyle`] other than `None`, one three-column file
//! (wavelength, flux, flux error) is also written per distinct object name.

use std::collections::HashSet;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::{Config, ExportStyle, InputConfig};
use crate::error::{Error, ExportError, Result};
use crate::retrieval::MergedTable;
use crate::table::format_array_cell;

/// Prefix for per-object files named after the bare identifier
const ID_NAME_PREFIX: &str = "GaiaDR3_";

/// Where a run's outputs go
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    /// Full merged table
    pub full: PathBuf,
    /// Coverage-only table
    pub cut: PathBuf,
    /// Directory for per-object files
    pub spectra_dir: PathBuf,
}

impl OutputPaths {
    /// Derive output locations from the input CSV path
    pub fn for_input(input: &Path, spectra_dir: &str) -> Result<Self> {
        let is_csv = input
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(Error::Config {
                message: format!("input file must be a csv: {}", input.display()),
                key: Some("input".to_string()),
            });
        }

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExportError::InvalidPath {
                path: input.to_path_buf(),
            })?;
        let parent = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            full: parent.join(format!("{stem}_XP_spectra.csv")),
            cut: parent.join(format!("{stem}_XP_spectra_cut.csv")),
            spectra_dir: parent.join(spectra_dir),
        })
    }
}

/// What [`save`] wrote
#[derive(Clone, Debug)]
pub struct SaveSummary {
    /// Paths used
    pub paths: OutputPaths,
    /// Rows in the full table
    pub full_rows: usize,
    /// Rows in the coverage-only table
    pub cut_rows: usize,
    /// Per-object files written
    pub object_files: Vec<PathBuf>,
}

/// Write the full table, the coverage-only table and any per-object files
pub fn save(merged: &MergedTable, input_path: &Path, config: &Config) -> Result<SaveSummary> {
    let paths = OutputPaths::for_input(input_path, &config.export.spectra_dir)?;

    let full_rows = write_merged(merged, &paths.full, false)?;
    let cut_rows = write_merged(merged, &paths.cut, true)?;
    tracing::info!(
        full = %paths.full.display(),
        full_rows,
        cut_rows,
        "Saved merged tables"
    );

    let object_files = if config.export.style == ExportStyle::None {
        Vec::new()
    } else {
        let wavelengths = config.fetch.effective_sampling().wavelengths()?;
        export_objects(
            merged,
            &config.input,
            config.export.style,
            &wavelengths,
            &paths.spectra_dir,
        )?
    };

    Ok(SaveSummary {
        paths,
        full_rows,
        cut_rows,
        object_files,
    })
}

/// Names of the two appended result columns, avoiding clashes with input columns
pub fn result_columns(headers: &[String]) -> (String, String) {
    let pick = |base: &str| {
        if headers.iter().any(|h| h == base) {
            format!("{base}_xp")
        } else {
            base.to_string()
        }
    };
    (pick("flux"), pick("flux_error"))
}

/// Write the merged table as CSV, optionally dropping unresolved rows.
///
/// Returns the number of data rows written.
pub fn write_merged(merged: &MergedTable, path: &Path, coverage_only: bool) -> Result<usize> {
    let input = merged.input();
    let (flux_col, error_col) = result_columns(input.headers());
    let width = input.headers().len();

    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = input.headers().iter().map(String::as_str).collect();
    header.push(&flux_col);
    header.push(&error_col);
    writer.write_record(&header)?;

    let mut written = 0;
    for (row, record) in input.records().iter().enumerate() {
        let spectrum = merged.spectrum(row);
        if coverage_only && spectrum.is_none() {
            continue;
        }

        let mut out: Vec<String> = Vec::with_capacity(width + 2);
        out.extend(record.iter().cloned());
        out.resize(width, String::new());
        match spectrum {
            Some(s) => {
                out.push(format_array_cell(&s.flux));
                out.push(format_array_cell(&s.flux_error));
            }
            None => {
                out.push(String::new());
                out.push(String::new());
            }
        }
        writer.write_record(&out)?;
        written += 1;
    }

    writer.flush()?;
    Ok(written)
}

/// Write one file per distinct object name among the resolved rows.
///
/// The first resolved row of each name is used. When the name column is the
/// identifier column the file is named `GaiaDR3_<id>`.
pub fn export_objects(
    merged: &MergedTable,
    input_config: &InputConfig,
    style: ExportStyle,
    wavelengths: &[f64],
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let extension = match style {
        ExportStyle::None => return Ok(Vec::new()),
        ExportStyle::Table => "csv",
        ExportStyle::Text => "txt",
    };

    let input = merged.input();
    let name_column = input_config.name_column();
    let name_index = input
        .column_index(name_column)
        .ok_or_else(|| Error::MissingColumn {
            column: name_column.to_string(),
        })?;
    let prefix_ids = name_column == input.id_column();

    std::fs::create_dir_all(dir)?;

    let mut seen = HashSet::new();
    let mut stems = HashSet::new();
    let mut written = Vec::new();
    for (row, spectrum) in merged.covered() {
        let raw = input.value(row, name_index).trim();
        if raw.is_empty() {
            tracing::warn!(row, "Resolved row has no object name, not exported");
            continue;
        }
        if !seen.insert(raw.to_string()) {
            continue;
        }

        let name = if prefix_ids {
            format!("{ID_NAME_PREFIX}{raw}")
        } else {
            raw.to_string()
        };
        let stem = unique_stem(file_stem_for(&name)?, &mut stems);
        if stem != name {
            tracing::warn!(object = %name, file = %stem, "Object file name adjusted");
        }
        let path = dir.join(format!("{stem}.{extension}"));
        write_object_file(
            &path,
            style,
            &name,
            wavelengths,
            &spectrum.flux,
            &spectrum.flux_error,
        )?;
        written.push(path);
    }

    tracing::info!(files = written.len(), dir = %dir.display(), "Saved per-object spectra");
    Ok(written)
}

/// Write one object's `(wavelength, flux, error)` samples.
pub fn write_object_file(
    path: &Path,
    style: ExportStyle,
    object: &str,
    wavelengths: &[f64],
    flux: &[f64],
    flux_error: &[f64],
) -> Result<()> {
    if flux.len() != wavelengths.len() || flux_error.len() != wavelengths.len() {
        return Err(ExportError::LengthMismatch {
            object: object.to_string(),
            grid: wavelengths.len(),
            flux: flux.len(),
            error: flux_error.len(),
        }
        .into());
    }

    let samples = wavelengths.iter().zip(flux).zip(flux_error);
    match style {
        ExportStyle::None => {}
        ExportStyle::Table => {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(["wave", "flux", "fluxerror"])?;
            for ((w, f), e) in samples {
                writer.write_record([w.to_string(), f.to_string(), e.to_string()])?;
            }
            writer.flush()?;
        }
        ExportStyle::Text => {
            let mut out = BufWriter::new(std::fs::File::create(path)?);
            for ((w, f), e) in samples {
                writeln!(out, "{w:.18e} {f:.18e} {e:.18e}")?;
            }
            out.flush()?;
        }
    }
    Ok(())
}

fn file_stem_for(name: &str) -> Result<String> {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    if stem == "." || stem == ".." {
        return Err(ExportError::InvalidObjectName {
            name: name.to_string(),
        }
        .into());
    }
    Ok(stem)
}

/// Suffix `_2`, `_3`, ... onto a stem another object already claimed
fn unique_stem(stem: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(stem.clone()) {
        return stem;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
