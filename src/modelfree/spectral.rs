use serde::{Deserialize, Serialize};

use super::relax::{RelaxEquations, GAMMA_H, GAMMA_N};

/// Lorentzian spectral density `0.4 tau / (1 + w^2 tau^2)` of isotropic tumbling
#[inline]
pub fn j_lorentz(omega: f64, tau: f64) -> f64 {
    0.4 * tau / (1.0 + omega * omega * tau * tau)
}

/// Reduced spectral density mapping of one R1, R2, NOE triple
///
/// The spectral density is sampled at `0`, `wN` and `0.87 wH`. Values are in s/rad.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralDensity {
    /// `[0, wN, 0.87 wH]`
    pub omegas: [f64; 3],
    pub values: [f64; 3],
    /// Propagated from the rate uncertainties, zero when none were given
    pub errors: [f64; 3],
}

impl SpectralDensity {
    pub fn from_r1_r2_noe(r1: f64, r2: f64, noe: f64, relax: &RelaxEquations) -> Self {
        Self::with_errors(r1, 0.0, r2, 0.0, noe, 0.0, relax)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_errors(
        r1: f64,
        r1_err: f64,
        r2: f64,
        r2_err: f64,
        noe: f64,
        noe_err: f64,
        relax: &RelaxEquations,
    ) -> Self {
        let d2 = relax.d2();
        let c2 = relax.c2();
        let sigma = (noe - 1.0) * r1 * GAMMA_N / GAMMA_H;
        let sigma_err = if noe != 1.0 && r1 != 0.0 {
            (sigma * ((noe_err / (noe - 1.0)).powi(2) + (r1_err / r1).powi(2)).sqrt()).abs()
        } else {
            0.0
        };

        let j_h = 4.0 * sigma / (5.0 * d2);
        let j_h_err = 4.0 * sigma_err / (5.0 * d2);

        let j_n_mul = 4.0 / (3.0 * d2 + 4.0 * c2);
        let j_n = (r1 - 1.249 * sigma) * j_n_mul;
        let j_n_err = j_n_mul * (r1_err.powi(2) + (1.249 * sigma_err).powi(2)).sqrt();

        let j0_mul = 6.0 / (3.0 * d2 + 4.0 * c2);
        let j0 = j0_mul * (r2 - 0.5 * r1 - 0.454 * sigma);
        let j0_err = j0_mul
            * (r2_err.powi(2) + (0.5 * r1_err).powi(2) + (0.454 * sigma_err).powi(2)).sqrt();

        SpectralDensity {
            omegas: [0.0, relax.w_s().abs(), 0.87 * relax.w_i()],
            values: [j0, j_n, j_h],
            errors: [j0_err, j_n_err, j_h_err],
        }
    }
}
