//! Overall tumbling time from the R2/R1 ratio
//!
//! For a rigid rotor the ratio of transverse to longitudinal relaxation depends only
//! on the correlation time, so matching the measured ratio gives a starting `Tau_e`
//! for model-free fits.

use argmin::core::{CostFunction, Error, Executor};
use argmin::solver::brent::BrentOpt;
use serde::{Deserialize, Serialize};

use super::models::MfModel;
use super::relax::{relax_equations, Nucleus, RelaxEquations};
use super::spectral::j_lorentz;
use super::ModelFreeError;
use crate::RelaxError;

/// Search range for the tumbling time, in ns
const TAU_RANGE: (f64, f64) = (1.0, 100.0);
const MAX_EVALUATIONS: u64 = 100;

/// Residues with R2 outside these percentiles are left out of a set estimate
pub const LOWER_PERCENTILE: f64 = 20.0;
pub const UPPER_PERCENTILE: f64 = 80.0;

/// Tumbling time estimated from one R1, R2 pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TauEstimate {
    pub r1: f64,
    pub r2: f64,
    /// Correlation time matching R2/R1 exactly, in ns
    pub tau: f64,
    /// Closed-form approximation, in ns. `None` when R2/R1 is below 7/6.
    pub tau_est: Option<f64>,
}

impl TauEstimate {
    /// Copy of `model` that fits `Tau_e` within `tau_fraction` of this estimate
    pub fn seed(&self, model: &MfModel, tau_fraction: f64) -> MfModel {
        MfModel {
            tau_m: self.tau,
            ..model.clone()
        }
        .with_fitted_tau(tau_fraction)
    }
}

struct RatioMismatch<'a> {
    relax: &'a RelaxEquations,
    ratio: f64,
}

impl CostFunction for RatioMismatch<'_> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, tau: &Self::Param) -> Result<Self::Output, Error> {
        Ok((self.ratio - r2_r1_ratio(self.relax, tau * 1.0e-9)).abs())
    }
}

/// R2/R1 of a rigid rotor with correlation time `tau` in s
pub fn r2_r1_ratio(relax: &RelaxEquations, tau: f64) -> f64 {
    let j: Vec<f64> = relax.omegas().iter().map(|w| j_lorentz(*w, tau)).collect();
    relax.r2(&j, 0.0) / relax.r1(&j)
}

/// Estimate the tumbling time of `1H`-`nucleus` pairs at `sf` Hz from one R1, R2 pair
pub fn estimate_tau(
    sf: f64,
    nucleus: Nucleus,
    r1: f64,
    r2: f64,
) -> Result<TauEstimate, RelaxError> {
    for rate in [r1, r2] {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(ModelFreeError::InvalidRate(rate).into());
        }
    }
    if nucleus == Nucleus::D {
        let pair = ModelFreeError::UnsupportedPair(Nucleus::H.to_string(), nucleus.to_string());
        return Err(pair.into());
    }
    let relax = relax_equations(sf, Nucleus::H, nucleus)?;
    let ratio = r2 / r1;
    let problem = RatioMismatch {
        relax: &relax,
        ratio,
    };
    let result = Executor::new(problem, BrentOpt::new(TAU_RANGE.0, TAU_RANGE.1))
        .configure(|state| state.max_iters(MAX_EVALUATIONS))
        .run()?;
    let tau = result.state.best_param.ok_or(ModelFreeError::NoData)?;

    let sf_x = sf * nucleus.frequency_ratio();
    let excess = 6.0 * ratio - 7.0;
    let tau_est =
        (excess > 0.0).then(|| excess.sqrt() / (4.0 * std::f64::consts::PI * sf_x) * 1.0e9);
    tracing::debug!(ratio, tau, ?tau_est, "Tumbling time estimated");
    Ok(TauEstimate {
        r1,
        r2,
        tau,
        tau_est,
    })
}

/// Estimate one tumbling time for a set of `(R1, R2)` pairs
///
/// Pairs whose R2 lies outside the 20th to 80th percentile band are dropped, since
/// flexible termini and exchanging residues distort the ratio. The medians of the
/// remaining R1 and R2 values are matched.
pub fn estimate_tau_from_set(
    sf: f64,
    nucleus: Nucleus,
    pairs: &[(f64, f64)],
) -> Result<TauEstimate, RelaxError> {
    let mut r2_sorted: Vec<f64> = pairs.iter().map(|(_, r2)| *r2).collect();
    r2_sorted.sort_by(|a, b| a.total_cmp(b));
    if r2_sorted.is_empty() {
        return Err(ModelFreeError::NoData.into());
    }
    let lower = percentile(&r2_sorted, LOWER_PERCENTILE);
    let upper = percentile(&r2_sorted, UPPER_PERCENTILE);

    let (mut r1_kept, mut r2_kept): (Vec<f64>, Vec<f64>) = pairs
        .iter()
        .filter(|(_, r2)| *r2 > lower && *r2 < upper)
        .copied()
        .unzip();
    if r1_kept.is_empty() {
        return Err(ModelFreeError::NoData.into());
    }
    tracing::debug!(kept = r1_kept.len(), total = pairs.len(), "R2 band filter");
    r1_kept.sort_by(|a, b| a.total_cmp(b));
    r2_kept.sort_by(|a, b| a.total_cmp(b));
    estimate_tau(
        sf,
        nucleus,
        percentile(&r1_kept, 50.0),
        percentile(&r2_kept, 50.0),
    )
}

/// Percentile of sorted values, positions taken as `p (n + 1) / 100`
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let pos = p * (n as f64 + 1.0) / 100.0;
    if pos < 1.0 {
        return sorted[0];
    }
    if pos >= n as f64 {
        return sorted[n - 1];
    }
    let index = pos.floor() as usize;
    let (below, above) = (sorted[index - 1], sorted[index]);
    below + (pos - pos.floor()) * (above - below)
}
