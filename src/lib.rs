//! # gaia-xp-dl
//!
//! Adaptive batched retrieval of Gaia DR3 XP sampled spectra.
//!
//! ## Design Philosophy
//!
//! gaia-xp-dl is designed to be:
//! - **Partial-failure tolerant** - A failed batch is re-tried at a finer granularity, never fatal
//! - **Sensible defaults** - Granularities, grid and worker count work out of the box
//! - **Library-first** - The CLI is a thin wrapper around [`run_batch`]
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use gaia_xp_dl::{Config, XpRetriever};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.fetch.endpoint = Some("https://xp.example.org/spectra".to_string());
//!
//!     let retriever = XpRetriever::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = retriever.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = retriever.run_batch("targets.csv".as_ref()).await?;
//!     println!("{} of {} resolved", summary.resolved, summary.requested);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Merged table and per-object export
pub mod export;
/// Request staggering for sequential dispatch
pub mod request_gate;
/// Batched retrieval with cascading retry
pub mod retrieval;
/// Wavelength sampling grids
pub mod sampling;
/// Input table reading and array cells
pub mod table;
/// Core types
pub mod types;

// Re-export commonly used types
pub use config::{
    Config, DispatchConfig, ExportConfig, ExportStyle, FetchConfig, InputConfig, RetryConfig,
    StaggerPolicy,
};
pub use error::{Error, ExportError, FetchError, Result};
pub use export::{OutputPaths, SaveSummary};
pub use retrieval::{
    BatchSummary, CascadeOutcome, FetchRequest, HttpSpectrumSource, LevelReport, MergedTable,
    SpectrumSource, XpRetriever,
};
pub use sampling::{SamplingFunction, SamplingSpec};
pub use table::InputTable;
pub use types::{Event, SourceId, SpectraTable, SpectrumRow};

/// Retrieve spectra for a CSV file using the configured HTTP endpoint
///
/// Convenience wrapper over [`XpRetriever::new`] and [`XpRetriever::run_batch`].
pub async fn run_batch(path: impl AsRef<std::path::Path>, config: Config) -> Result<BatchSummary> {
    let retriever = XpRetriever::new(config)?;
    retriever.run_batch(path.as_ref()).await
}
