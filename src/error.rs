//! Error types for gaia-xp-dl
//!
//! This module separates the two failure domains of a batch run:
//! - [`Error`] is what a caller of the library sees. Only input, configuration,
//!   I/O and total-retrieval failures surface here.
//! - [`FetchError`] describes why a single remote batch call produced nothing.
//!   It never escapes the dispatcher; it is logged and the affected identifiers
//!   become stragglers for the next retry level.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gaia-xp-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for gaia-xp-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "retry.granularities")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// HTTP client could not be constructed
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured identifier or name column is absent from the input table
    #[error("column '{column}' not found in input table")]
    MissingColumn {
        /// Name of the missing column
        column: String,
    },

    /// An identifier cell could not be parsed as an integer
    #[error("invalid identifier '{value}' on row {row}")]
    InvalidIdentifier {
        /// 1-based data row number (header excluded)
        row: usize,
        /// The offending cell content
        value: String,
    },

    /// The input table contains no data rows
    #[error("input table has no rows")]
    EmptyInput,

    /// Wavelength sampling specification rejected
    #[error("invalid sampling: {0}")]
    InvalidSampling(String),

    /// Array cell could not be parsed back into numbers
    #[error("invalid array cell: {0}")]
    InvalidArrayCell(String),

    /// The first retrieval level resolved nothing at all
    ///
    /// Signals that the remote service or the credentials are not working,
    /// as opposed to ordinary partial coverage.
    #[error("all batches failed: none of {requested} identifiers could be retrieved")]
    AllBatchesFailed {
        /// Number of distinct identifiers that were requested
        requested: usize,
    },

    /// Export of merged results failed
    #[error("export error: {0}")]
    Export(#[from] ExportError),
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Csv(_) => "csv_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::MissingColumn { .. } => "missing_column",
            Error::InvalidIdentifier { .. } => "invalid_identifier",
            Error::EmptyInput => "empty_input",
            Error::InvalidSampling(_) => "invalid_sampling",
            Error::InvalidArrayCell(_) => "invalid_array_cell",
            Error::AllBatchesFailed { .. } => "all_batches_failed",
            Error::Export(_) => "export_error",
        }
    }

    /// Process exit code used by the command line front end
    ///
    /// Usage problems map to 2, retrieval failure to 3, everything else to 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. }
            | Error::MissingColumn { .. }
            | Error::InvalidIdentifier { .. }
            | Error::EmptyInput
            | Error::InvalidSampling(_) => 2,
            Error::AllBatchesFailed { .. } => 3,
            _ => 1,
        }
    }
}

/// Reason a single remote batch call yielded no rows
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, timeout or other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Remote service answered with a non-success status
    #[error("remote service returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Response body could not be decoded into spectra
    #[error("malformed response: {0}")]
    Decode(String),

    /// The task running the call panicked or was aborted
    #[error("fetch task failed: {0}")]
    Panicked(String),
}

impl FetchError {
    /// Returns true when the failure is likely to clear up on a later attempt
    ///
    /// Transient failures are reported at info level and permanent ones at
    /// warn, as they usually point at credentials or a bad request.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Decode(_) => true,
            FetchError::Panicked(_) => true,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// Per-object export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Flux or error arrays do not match the wavelength grid
    #[error(
        "object {object}: wavelength grid has {grid} samples but flux has {flux} and error has {error}"
    )]
    LengthMismatch {
        /// Object name the file would have been written for
        object: String,
        /// Number of wavelength samples
        grid: usize,
        /// Number of flux samples
        flux: usize,
        /// Number of flux error samples
        error: usize,
    },

    /// Object name cannot be turned into a file name
    #[error("object name '{name}' cannot be used as a file name")]
    InvalidObjectName {
        /// The rejected name
        name: String,
    },

    /// Input path has no usable parent directory or stem
    #[error("invalid output location derived from {path}")]
    InvalidPath {
        /// The input path
        path: PathBuf,
    },
}
