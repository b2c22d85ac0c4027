//! Fit configuration
//!
//! [FitOptions] is passed explicitly to every fitting entry point, there is no global
//! configuration state. Options serialize with serde so they can be stored next to
//! results or read from a JSON file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RelaxError;

/// How parameter uncertainties are estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BootstrapMode {
    /// Refit simulated data: best-fit curve plus Gaussian noise
    Parametric,
    /// Refit the best-fit curve plus resampled standardized residuals
    NonParametric,
    /// No uncertainty estimate
    None,
}

impl fmt::Display for BootstrapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapMode::Parametric => "parametric",
            BootstrapMode::NonParametric => "nonparametric",
            BootstrapMode::None => "none",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for BootstrapMode {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parametric" => Ok(BootstrapMode::Parametric),
            "nonparametric" => Ok(BootstrapMode::NonParametric),
            "none" => Ok(BootstrapMode::None),
            other => Err(RelaxError::Config(format!(
                "unknown bootstrap mode '{}'",
                other
            ))),
        }
    }
}

/// Information criterion used to pick the best equation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Aic,
    Aicc,
}

/// Options controlling the optimizer, the bootstrap and the batch fitter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Uncertainty estimation (default: parametric)
    pub bootstrap: BootstrapMode,
    /// Number of bootstrap resamples (default: 200)
    pub n_samples: usize,
    /// Base seed for the bootstrap generators, random when `None`
    pub seed: Option<u64>,
    /// Iteration cap for one simplex run (default: 2000)
    pub max_iterations: u64,
    /// Simplex standard-deviation tolerance (default: 1e-8)
    pub tolerance: f64,
    /// Number of restarts from the best point (default: 2)
    pub restarts: usize,
    /// Worker threads for the batch fitter (default: half the logical cores)
    pub n_processes: usize,
    /// Fraction of failed resamples above which a bootstrap is flagged (default: 0.1)
    pub max_failure_fraction: f64,
    /// Weight residuals by the supplied uncertainties (default: true)
    pub weighted: bool,
    /// Model selection criterion (default: AIC)
    pub criterion: Criterion,
    /// Exchange is only reported when Rex exceeds this multiple of the RMS (default: 3)
    pub rex_ratio: f64,
    /// Show an indicatif progress bar in batch fits (default: false)
    pub progress_bar: bool,
    /// Upper limit for CPMG exchange rates in s-1 (default: 2000)
    pub cpmg_max_freq: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            bootstrap: BootstrapMode::Parametric,
            n_samples: 200,
            seed: None,
            max_iterations: 2000,
            tolerance: 1e-8,
            restarts: 2,
            n_processes: default_processes(),
            max_failure_fraction: 0.1,
            weighted: true,
            criterion: Criterion::Aic,
            rex_ratio: 3.0,
            progress_bar: false,
            cpmg_max_freq: 2000.0,
        }
    }
}

fn default_processes() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

impl FitOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bootstrap(mut self, mode: BootstrapMode) -> Self {
        self.bootstrap = mode;
        self
    }

    /// Skip uncertainty estimation
    pub fn without_bootstrap(mut self) -> Self {
        self.bootstrap = BootstrapMode::None;
        self
    }

    pub fn with_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_processes(mut self, n_processes: usize) -> Self {
        self.n_processes = n_processes.max(1);
        self
    }

    pub fn with_max_failure_fraction(mut self, fraction: f64) -> Self {
        self.max_failure_fraction = fraction;
        self
    }

    /// Ignore supplied uncertainties and fit unweighted residuals
    pub fn without_weights(mut self) -> Self {
        self.weighted = false;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_rex_ratio(mut self, ratio: f64) -> Self {
        self.rex_ratio = ratio;
        self
    }

    pub fn with_progress(mut self) -> Self {
        self.progress_bar = true;
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.progress_bar = false;
        self
    }

    pub fn with_cpmg_max_freq(mut self, max_freq: f64) -> Self {
        self.cpmg_max_freq = max_freq;
        self
    }

    /// Parse options from JSON, missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, RelaxError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, RelaxError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = FitOptions::default();
        assert_eq!(options.bootstrap, BootstrapMode::Parametric);
        assert_eq!(options.n_samples, 200);
        assert!(options.n_processes >= 1);
        assert_eq!(options.criterion, Criterion::Aic);
    }

    #[test]
    fn test_json_fills_defaults() {
        let options =
            FitOptions::from_json(r#"{"bootstrap": "nonparametric", "seed": 7}"#).unwrap();
        assert_eq!(options.bootstrap, BootstrapMode::NonParametric);
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.max_iterations, 2000);

        let round = FitOptions::from_json(&options.to_json().unwrap()).unwrap();
        assert_eq!(round.bootstrap, options.bootstrap);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        assert!(matches!(
            FitOptions::from_json(r#"{"bootstrap": "jackknife"}"#),
            Err(RelaxError::Config(_))
        ));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(
            "NonParametric".parse::<BootstrapMode>().unwrap(),
            BootstrapMode::NonParametric
        );
        assert!("other".parse::<BootstrapMode>().is_err());
    }
}
