//! Bootstrap uncertainty estimation
//!
//! Every resample is refit from the best-fit point. Resamples run in parallel and each
//! draws from its own [StdRng] seeded with `base_seed + index`, so a fixed seed gives
//! identical results regardless of thread scheduling.

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

use crate::fit::optimizer::{minimize, PENALTY};
use crate::fit::problem::FitProblem;
use crate::fit::{BootstrapMode, FitOptions};
use crate::RelaxError;

/// Outcome of a bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapSummary {
    /// One row per successful resample, one column per global parameter
    pub samples: Array2<f64>,
    /// Standard deviation of each parameter over the samples
    pub errors: Vec<f64>,
    pub n_requested: usize,
    pub n_failed: usize,
    /// More resamples failed than the configured fraction allows
    pub reduced_sample: bool,
}

pub(crate) fn bootstrap(
    problem: &FitProblem,
    best: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Result<BootstrapSummary, RelaxError> {
    let n_params = best.len();
    let fitted = problem.predictions(best);
    let observed = problem.observed();
    let errors = problem.errors();
    let n = observed.len();

    let sum_sq: f64 = observed
        .iter()
        .zip(fitted.iter())
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    let dof = if n > n_params { n - n_params } else { n.max(1) };
    let residual_sd = (sum_sq / dof as f64).sqrt();
    let standardized: Vec<f64> = observed
        .iter()
        .zip(fitted.iter())
        .zip(errors.iter())
        .map(|((y, f), e)| (y - f) / e)
        .collect();

    let base_seed = options.seed.unwrap_or_else(|| rand::rng().random());
    let refit_options = FitOptions {
        restarts: 0,
        ..options.clone()
    };

    let resample = |index: usize| -> Option<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
        let simulated: Vec<f64> = match options.bootstrap {
            BootstrapMode::Parametric => fitted
                .iter()
                .zip(errors.iter())
                .map(|(f, e)| {
                    let sd = if problem.is_weighted() { *e } else { residual_sd };
                    match Normal::new(0.0, sd) {
                        Ok(normal) => f + normal.sample(&mut rng),
                        Err(_) => *f,
                    }
                })
                .collect(),
            BootstrapMode::NonParametric => fitted
                .iter()
                .zip(errors.iter())
                .map(|(f, e)| f + standardized[rng.random_range(0..n)] * e)
                .collect(),
            BootstrapMode::None => return None,
        };

        let refit = minimize(
            |p: &[f64]| problem.chi_square_with(p, &simulated),
            best,
            lower,
            upper,
            &refit_options,
        );
        match refit {
            Ok(minimum) if minimum.cost.is_finite() && minimum.cost < PENALTY => {
                Some(minimum.params)
            }
            Ok(_) => {
                tracing::debug!(index, "Dropped bootstrap resample with undefined cost");
                None
            }
            Err(error) => {
                tracing::debug!(index, %error, "Dropped bootstrap resample");
                None
            }
        }
    };

    let results: Vec<Option<Vec<f64>>> = (0..options.n_samples)
        .into_par_iter()
        .map(resample)
        .collect();

    let successful: Vec<Vec<f64>> = results.into_iter().flatten().collect();
    let n_failed = options.n_samples - successful.len();
    let flat: Vec<f64> = successful.iter().flatten().copied().collect();
    let samples = Array2::from_shape_vec((successful.len(), n_params), flat)
        .map_err(|e| RelaxError::Optimizer(e.to_string()))?;

    let errors = if samples.nrows() >= 2 {
        samples.std_axis(Axis(0), 1.0).to_vec()
    } else {
        vec![0.0; n_params]
    };

    let reduced_sample = options.n_samples > 0
        && n_failed as f64 / options.n_samples as f64 > options.max_failure_fraction;
    if reduced_sample {
        tracing::warn!(
            failed = n_failed,
            requested = options.n_samples,
            "Bootstrap ran on a reduced sample"
        );
    } else if n_failed > 0 {
        tracing::warn!(failed = n_failed, "Some bootstrap resamples were dropped");
    }

    Ok(BootstrapSummary {
        samples,
        errors,
        n_requested: options.n_samples,
        n_failed,
        reduced_sample,
    })
}
