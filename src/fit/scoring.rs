use serde::{Deserialize, Serialize};

use crate::fit::Criterion;

/// Goodness-of-fit statistics of one fit
///
/// `rss` is the weighted sum of squared residuals (chi-square, or the plain sum of
/// squares for unweighted data) and drives AIC, AICc and the reduced chi-square. `rms`
/// is always computed on the unweighted residuals.
///
/// AIC uses the least-squares form `n ln(rss / n) + 2k`, which differs from the
/// likelihood form by a constant for a given dataset and so ranks equations the same
/// way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub n: usize,
    pub k: usize,
    pub rss: f64,
    pub rms: f64,
    pub aic: f64,
    pub aicc: f64,
    pub reduced_chi_sq: f64,
}

impl Scores {
    /// # Arguments
    ///
    /// * `n` - Number of data points
    /// * `k` - Number of fitted (global) parameters
    /// * `rss` - Weighted sum of squared residuals
    /// * `sum_sq` - Unweighted sum of squared residuals
    pub fn new(n: usize, k: usize, rss: f64, sum_sq: f64) -> Self {
        let nf = n as f64;
        let kf = k as f64;
        let aic = if !rss.is_finite() {
            f64::INFINITY
        } else if n > 0 {
            // an exact fit would give ln(0)
            nf * (rss.max(f64::MIN_POSITIVE) / nf).ln() + 2.0 * kf
        } else {
            f64::INFINITY
        };
        let aicc = if n > k + 1 {
            aic + 2.0 * kf * (kf + 1.0) / (nf - kf - 1.0)
        } else {
            f64::INFINITY
        };
        let reduced_chi_sq = if n > k && rss.is_finite() {
            rss / (nf - kf)
        } else {
            f64::INFINITY
        };
        let rms = if n > 0 { (sum_sq / nf).sqrt() } else { 0.0 };
        Scores {
            n,
            k,
            rss,
            rms,
            aic,
            aicc,
            reduced_chi_sq,
        }
    }

    /// Value of the selection criterion, lower is better
    pub fn criterion(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Aic => self.aic,
            Criterion::Aicc => self.aicc,
        }
    }
}
