//! Wavelength sampling grids
//!
//! A sampling is described by a closed grammar of four tokens:
//! `<function> <start> <stop> <param>` where `function` is `linspace`
//! (param = number of samples, stop inclusive) or `arange` (param = step,
//! stop exclusive). Values are in absolute nanometres.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upper bound on grid length, far above anything the service can sample
const MAX_SAMPLES: usize = 1_000_000;

/// Grid construction function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingFunction {
    /// Evenly spaced samples, stop inclusive, param is the sample count
    Linspace,
    /// Fixed step from start, stop exclusive, param is the step
    Arange,
}

impl FromStr for SamplingFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linspace" => Ok(Self::Linspace),
            "arange" => Ok(Self::Arange),
            other => Err(Error::InvalidSampling(format!(
                "unknown function '{other}', expected 'linspace' or 'arange'"
            ))),
        }
    }
}

/// Validated description of a wavelength grid
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingSpec {
    /// Construction function
    pub function: SamplingFunction,
    /// First wavelength
    pub start: f64,
    /// Last (linspace) or bound (arange) wavelength
    pub stop: f64,
    /// Sample count (linspace) or step (arange)
    pub param: f64,
}

impl Default for SamplingSpec {
    /// `arange(336, 1201, 2)`, the service's default 433-point grid
    fn default() -> Self {
        Self {
            function: SamplingFunction::Arange,
            start: 336.0,
            stop: 1201.0,
            param: 2.0,
        }
    }
}

impl SamplingSpec {
    /// Build a spec from the four command line tokens
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let [function, start, stop, param] = args else {
            return Err(Error::InvalidSampling(format!(
                "expected 4 values (function start stop param), got {}",
                args.len()
            )));
        };
        let spec = Self {
            function: function.as_ref().parse()?,
            start: parse_number("start", start.as_ref())?,
            stop: parse_number("stop", stop.as_ref())?,
            param: parse_number("param", param.as_ref())?,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check the grid is finite and non-empty
    pub fn validate(&self) -> Result<()> {
        self.sample_count().map(|_| ())
    }

    /// Number of samples the grid will contain
    pub fn sample_count(&self) -> Result<usize> {
        if !(self.start.is_finite() && self.stop.is_finite() && self.param.is_finite()) {
            return Err(Error::InvalidSampling(
                "start, stop and param must be finite".into(),
            ));
        }

        let count = match self.function {
            SamplingFunction::Linspace => {
                if self.param < 1.0 || self.param.fract() != 0.0 {
                    return Err(Error::InvalidSampling(format!(
                        "linspace sample count must be a positive integer, got {}",
                        self.param
                    )));
                }
                self.param
            }
            SamplingFunction::Arange => {
                if self.param == 0.0 {
                    return Err(Error::InvalidSampling("arange step must be non-zero".into()));
                }
                ((self.stop - self.start) / self.param).ceil().max(0.0)
            }
        };

        if count < 1.0 {
            return Err(Error::InvalidSampling(format!(
                "{:?} {} {} {} produces no samples",
                self.function, self.start, self.stop, self.param
            )));
        }
        if count > MAX_SAMPLES as f64 {
            return Err(Error::InvalidSampling(format!(
                "grid of {count} samples exceeds the limit of {MAX_SAMPLES}"
            )));
        }
        Ok(count as usize)
    }

    /// Materialize the wavelength grid
    pub fn wavelengths(&self) -> Result<Vec<f64>> {
        let count = self.sample_count()?;
        let grid = match self.function {
            SamplingFunction::Linspace => {
                if count == 1 {
                    vec![self.start]
                } else {
                    let step = (self.stop - self.start) / (count - 1) as f64;
                    let mut grid: Vec<f64> =
                        (0..count).map(|i| self.start + step * i as f64).collect();
                    // stop is inclusive and should not carry accumulated rounding
                    grid[count - 1] = self.stop;
                    grid
                }
            }
            SamplingFunction::Arange => (0..count)
                .map(|i| self.start + self.param * i as f64)
                .collect(),
        };
        Ok(grid)
    }
}

impl FromStr for SamplingSpec {
    type Err = Error;

    /// Parse a whitespace separated spec such as `"linspace 600 1050 120"`
    fn from_str(s: &str) -> Result<Self> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        Self::from_args(&tokens)
    }
}

impl std::fmt::Display for SamplingSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self.function {
            SamplingFunction::Linspace => "linspace",
            SamplingFunction::Arange => "arange",
        };
        write!(f, "{} {} {} {}", name, self.start, self.stop, self.param)
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::InvalidSampling(format!("{field} '{raw}' is not a number")))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_grid_matches_service_default() {
        let grid = SamplingSpec::default().wavelengths().unwrap();
        assert_eq!(grid.len(), 433);
        assert_eq!(grid[0], 336.0);
        assert_eq!(grid[432], 1200.0, "arange stop is exclusive");
    }

    #[test]
    fn linspace_includes_both_ends() {
        let spec: SamplingSpec = "linspace 600 1050 120".parse().unwrap();
        let grid = spec.wavelengths().unwrap();
        assert_eq!(grid.len(), 120);
        assert_eq!(grid[0], 600.0);
        assert_eq!(grid[119], 1050.0);
        assert!(grid.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn single_sample_linspace_is_start() {
        let spec: SamplingSpec = "linspace 500 900 1".parse().unwrap();
        assert_eq!(spec.wavelengths().unwrap(), vec![500.0]);
    }

    #[test]
    fn function_name_is_case_insensitive() {
        let spec: SamplingSpec = "ARange 400 410 5".parse().unwrap();
        assert_eq!(spec.wavelengths().unwrap(), vec![400.0, 405.0]);
    }

    #[test]
    fn unknown_function_is_rejected_not_evaluated() {
        let err = "__import__('os') 1 2 3".parse::<SamplingSpec>().unwrap_err();
        assert!(matches!(err, Error::InvalidSampling(_)));
    }

    #[test]
    fn wrong_token_count_is_rejected() {
        assert!("linspace 1 2".parse::<SamplingSpec>().is_err());
        assert!("linspace 1 2 3 4".parse::<SamplingSpec>().is_err());
    }

    #[test]
    fn fractional_linspace_count_is_rejected() {
        assert!("linspace 600 1050 12.5".parse::<SamplingSpec>().is_err());
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!("arange 600 1050 0".parse::<SamplingSpec>().is_err());
    }

    #[test]
    fn empty_arange_is_rejected() {
        assert!(
            "arange 1050 600 5".parse::<SamplingSpec>().is_err(),
            "positive step with stop below start yields no samples"
        );
    }

    #[test]
    fn descending_arange_is_allowed() {
        let spec: SamplingSpec = "arange 10 0 -5".parse().unwrap();
        assert_eq!(spec.wavelengths().unwrap(), vec![10.0, 5.0]);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let spec: SamplingSpec = "linspace 600 1050 120".parse().unwrap();
        let again: SamplingSpec = spec.to_string().parse().unwrap();
        assert_eq!(spec, again);
    }
}
