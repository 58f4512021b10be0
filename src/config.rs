//! Configuration types for gaia-xp-dl

use crate::error::{Error, Result};
use crate::sampling::SamplingSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Input table settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputConfig {
    /// Column holding the identifiers, also the join key of every merge (default: "source_id")
    #[serde(default = "default_id_column")]
    pub id_column: String,

    /// Column naming objects for per-object export (default: the identifier column)
    #[serde(default)]
    pub name_column: Option<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            name_column: None,
        }
    }
}

impl InputConfig {
    /// Column used to name per-object files
    pub fn name_column(&self) -> &str {
        self.name_column.as_deref().unwrap_or(&self.id_column)
    }
}

/// Remote calibration service settings
#[derive(Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Calibration endpoint URL (required when using the HTTP source)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Wavelength sampling; the service default grid when None
    #[serde(default)]
    pub sampling: Option<SamplingSpec>,

    /// Truncate the set of basis functions
    #[serde(default)]
    pub truncate: bool,

    /// Archive username
    #[serde(default)]
    pub username: Option<String>,

    /// Archive password
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Per-request timeout (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            sampling: None,
            truncate: false,
            username: None,
            password: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for FetchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchConfig")
            .field("endpoint", &self.endpoint)
            .field("sampling", &self.sampling)
            .field("truncate", &self.truncate)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl FetchConfig {
    /// Sampling in effect, falling back to the service default grid
    pub fn effective_sampling(&self) -> SamplingSpec {
        self.sampling.unwrap_or_default()
    }
}

/// Cascading retry settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Batch granularities, coarsest first (default: [1000, 100, 10, 1])
    ///
    /// Each entry also serves as the escalation threshold of the level after it:
    /// an intermediate level only runs while more stragglers remain than the
    /// previous level's granularity. The last level always runs if anything is
    /// left unresolved.
    #[serde(default = "default_granularities")]
    pub granularities: Vec<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            granularities: default_granularities(),
        }
    }
}

/// How per-identifier calls are staggered when a level falls back to sequential dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StaggerPolicy {
    /// Serialize call starts behind a gate, sleeping `delay` while holding it
    Gated {
        /// Delay per call (milliseconds in serialized form)
        #[serde(with = "millis_serde")]
        delay: Duration,
    },
    /// Sleep `step × index` before the call with the given index
    Indexed {
        /// Delay increment per call index (milliseconds in serialized form)
        #[serde(with = "millis_serde")]
        step: Duration,
    },
}

impl Default for StaggerPolicy {
    fn default() -> Self {
        Self::Gated {
            delay: Duration::from_secs(1),
        }
    }
}

/// Parallel dispatch settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Worker count used for chunk sizing (default: available parallelism - 1, at least 1)
    #[serde(default)]
    pub workers: Option<usize>,

    /// Maximum concurrent batch calls (default: available parallelism)
    #[serde(default)]
    pub pool_size: Option<usize>,

    /// Stagger policy for the sequential fallback
    #[serde(default)]
    pub stagger: StaggerPolicy,
}

impl DispatchConfig {
    /// Worker count after applying the default
    pub fn worker_count(&self) -> usize {
        self.workers
            .unwrap_or_else(|| crate::retrieval::reserved_worker_count(available_parallelism()))
            .max(1)
    }

    /// Pool size after applying the default
    pub fn pool_size(&self) -> usize {
        self.pool_size.unwrap_or_else(available_parallelism).max(1)
    }
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Per-object export format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStyle {
    /// Only the merged and coverage tables are written (default)
    #[default]
    None,
    /// One CSV table per object with a `wave,flux,fluxerror` header
    #[serde(alias = "fits")]
    Table,
    /// One whitespace separated numeric text file per object
    #[serde(alias = "txt")]
    Text,
}

/// Output settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Per-object export style
    #[serde(default)]
    pub style: ExportStyle,

    /// Directory (next to the input file) receiving per-object files (default: "outputspectra")
    #[serde(default = "default_spectra_dir")]
    pub spectra_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            style: ExportStyle::default(),
            spectra_dir: default_spectra_dir(),
        }
    }
}

/// Main configuration for a batch run
///
/// Every field has a sensible default; `Config::default()` is a valid
/// configuration apart from the HTTP endpoint, which only matters when the
/// built-in HTTP source is used.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input table settings
    #[serde(default)]
    pub input: InputConfig,

    /// Remote service settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry cascade settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Dispatcher settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Output settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Report absorbed batch failures and progress
    #[serde(default)]
    pub verbose: bool,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check invariants that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.input.id_column.trim().is_empty() {
            return Err(config_error("identifier column must not be empty", "input.id_column"));
        }

        let levels = &self.retry.granularities;
        if levels.is_empty() {
            return Err(config_error(
                "at least one granularity is required",
                "retry.granularities",
            ));
        }
        if levels.contains(&0) {
            return Err(config_error(
                "granularities must be at least 1",
                "retry.granularities",
            ));
        }
        if levels.windows(2).any(|w| w[1] >= w[0]) {
            return Err(config_error(
                "each granularity must be strictly finer than the previous one",
                "retry.granularities",
            ));
        }

        if self.dispatch.workers == Some(0) {
            return Err(config_error("workers must be at least 1", "dispatch.workers"));
        }
        if self.dispatch.pool_size == Some(0) {
            return Err(config_error("pool_size must be at least 1", "dispatch.pool_size"));
        }

        if let Some(sampling) = &self.fetch.sampling {
            sampling.validate()?;
        }
        if self.fetch.request_timeout.is_zero() {
            return Err(config_error(
                "request_timeout must be greater than zero",
                "fetch.request_timeout",
            ));
        }
        if self.fetch.password.is_some() && self.fetch.username.is_none() {
            return Err(config_error("password given without username", "fetch.username"));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_id_column() -> String {
    "source_id".to_string()
}

fn default_granularities() -> Vec<usize> {
    vec![1000, 100, 10, 1]
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_spectra_dir() -> String {
    "outputspectra".to_string()
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond Duration serialization helper
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SamplingFunction;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().expect("defaults must validate");
    }

    #[test]
    fn default_request_timeout_applies_without_deserializing() {
        assert_eq!(
            Config::default().fetch.request_timeout,
            Duration::from_secs(300)
        );
        assert_eq!(
            FetchConfig::default().request_timeout,
            default_request_timeout()
        );
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let mut config = Config::default();
        config.fetch.request_timeout = Duration::ZERO;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("fetch.request_timeout"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn default_granularities_are_decades() {
        assert_eq!(Config::default().retry.granularities, vec![1000, 100, 10, 1]);
    }

    #[test]
    fn name_column_falls_back_to_id_column() {
        let mut input = InputConfig::default();
        assert_eq!(input.name_column(), "source_id");
        input.name_column = Some("shortname".into());
        assert_eq!(input.name_column(), "shortname");
    }

    #[test]
    fn non_decreasing_granularities_are_rejected() {
        let mut config = Config::default();
        config.retry.granularities = vec![100, 100, 1];

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("retry.granularities"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_granularity_is_rejected() {
        let mut config = Config::default();
        config.retry.granularities = vec![10, 0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_granularities_are_rejected() {
        let mut config = Config::default();
        config.retry.granularities.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut config = Config::default();
        config.dispatch.workers = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn password_without_username_is_rejected() {
        let mut config = Config::default();
        config.fetch.password = Some("secret".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn worker_count_honours_override() {
        let dispatch = DispatchConfig {
            workers: Some(6),
            ..DispatchConfig::default()
        };
        assert_eq!(dispatch.worker_count(), 6);
        assert!(DispatchConfig::default().worker_count() >= 1);
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let fetch = FetchConfig {
            username: Some("astro".into()),
            password: Some("hunter2".into()),
            ..FetchConfig::default()
        };
        let rendered = format!("{fetch:?}");
        assert!(rendered.contains("astro"));
        assert!(!rendered.contains("hunter2"), "password leaked: {rendered}");
    }

    #[test]
    fn password_is_never_serialized() {
        let mut config = Config::default();
        config.fetch.username = Some("astro".into());
        config.fetch.password = Some("hunter2".into());

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{
            "input": {"id_column": "dr3_id", "name_column": "shortname"},
            "fetch": {"sampling": {"function": "linspace", "start": 600, "stop": 1050, "param": 120}},
            "dispatch": {"stagger": {"mode": "indexed", "step": 10}},
            "export": {"style": "txt"}
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.input.id_column, "dr3_id");
        assert_eq!(config.input.name_column(), "shortname");
        assert_eq!(
            config.fetch.sampling.map(|s| s.function),
            Some(SamplingFunction::Linspace)
        );
        assert_eq!(config.fetch.request_timeout, Duration::from_secs(300));
        assert_eq!(config.retry.granularities, vec![1000, 100, 10, 1]);
        assert_eq!(
            config.dispatch.stagger,
            StaggerPolicy::Indexed {
                step: Duration::from_millis(10)
            }
        );
        assert_eq!(config.export.style, ExportStyle::Text);
        assert_eq!(config.export.spectra_dir, "outputspectra");
    }

    #[test]
    fn stagger_policy_serializes_as_milliseconds() {
        let json = serde_json::to_value(StaggerPolicy::default()).unwrap();
        assert_eq!(json["mode"], "gated");
        assert_eq!(json["delay"], 1000);
    }

    #[test]
    fn config_loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"retry": {"granularities": [500, 50, 5]}}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.retry.granularities, vec![500, 50, 5]);
        config.validate().unwrap();
    }

    #[test]
    fn malformed_json_file_is_a_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            Config::from_json_file(&path),
            Err(Error::Serialization(_))
        ));
    }
}
