//! Chemical exchange saturation transfer
//!
//! Intensities are normalized to the reference experiment without saturation, so far
//! off resonance the profile decays to `exp(-tex * R1)`. Layout and parameter lists
//! follow [crate::equation::r1rho].

use super::bloch::TwoSite;
use super::r1rho::{
    baldwin_kay_rate, exact_rate, exchange_guess_for, laguerre_rate, no_exchange_rate, noex_guess_for,
    one_site, profile_bounds, trott_rate, two_site, Profile, Tilt, EXCHANGE_PARS,
    EXCHANGE_SCOPES, NOEX_PARS, NOEX_SCOPES, R1_LINKED, RATES_LINKED,
};
use super::EquationType;
use crate::data::{Experiment, ExperimentKind};
use crate::fit::FitOptions;

/// Relative weights of the B1 inhomogeneity distribution
const B1_WEIGHTS: [f64; 11] = [
    0.022, 0.0444, 0.0777, 0.1159, 0.1473, 0.1596, 0.1473, 0.1159, 0.0777, 0.0444, 0.0216,
];
/// Fractional B1 deviation covered by the distribution, on either side
const B1_SPREAD: f64 = 0.4;

pub static EQUATIONS: [EquationType; 7] = [
    EquationType::new(
        "CESTR1RHONOEX",
        ExperimentKind::Cest,
        NOEX_PARS,
        NOEX_SCOPES,
        &[],
        None,
        no_exchange,
        noex_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTR1RHOPERTURBATION",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        perturbation,
        exchange_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTR1RHOBALDWINKAY",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        baldwin_kay,
        exchange_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTR1RHOSD",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        b1_distribution,
        exchange_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTR1RHOLAGUERRE",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        RATES_LINKED,
        Some(0),
        laguerre,
        exchange_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTR1RHOEXACT1",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        exact1,
        exchange_guess,
        cest_bounds,
    ),
    EquationType::new(
        "CESTEXACT0",
        ExperimentKind::Cest,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        exact0,
        exchange_guess,
        cest_bounds,
    )
    .with_tex(),
];

/// Longitudinal intensity left after spin-locking at the averaged tilt for `tex`
fn saturated(s: &TwoSite, tex: f64, rate: fn(&TwoSite) -> f64) -> f64 {
    Tilt::new(s).cos2() * (-tex * rate(s)).exp()
}

pub fn no_exchange(params: &[f64], x: &[f64]) -> f64 {
    saturated(&one_site(params, x), x[2], no_exchange_rate)
}

pub fn perturbation(params: &[f64], x: &[f64]) -> f64 {
    saturated(&two_site(params, x), x[2], trott_rate)
}

pub fn baldwin_kay(params: &[f64], x: &[f64]) -> f64 {
    saturated(&two_site(params, x), x[2], baldwin_kay_rate)
}

pub fn laguerre(params: &[f64], x: &[f64]) -> f64 {
    saturated(&two_site(params, x), x[2], laguerre_rate)
}

/// Perturbation profile averaged over the B1 inhomogeneity distribution
pub fn b1_distribution(params: &[f64], x: &[f64]) -> f64 {
    let nominal = two_site(params, x);
    let total: f64 = B1_WEIGHTS.iter().sum();
    let step = 2.0 * B1_SPREAD / (B1_WEIGHTS.len() - 1) as f64;
    B1_WEIGHTS
        .iter()
        .enumerate()
        .map(|(i, weight)| {
            let fraction = -B1_SPREAD + step * i as f64;
            let s = TwoSite {
                omega1: nominal.omega1 * (1.0 + fraction),
                ..nominal
            };
            weight / total * saturated(&s, x[2], trott_rate)
        })
        .sum()
}

pub fn exact1(params: &[f64], x: &[f64]) -> f64 {
    saturated(&two_site(params, x), x[2], exact_rate)
}

pub fn exact0(params: &[f64], x: &[f64]) -> f64 {
    two_site(params, x).saturated_magnetization(x[2])
}

fn noex_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    noex_guess_for(experiment, Profile::Cest)
}

fn exchange_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    exchange_guess_for(experiment, Profile::Cest)
}

fn cest_bounds(
    guess: &[f64],
    experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    profile_bounds(guess, experiment, Profile::Cest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TEX: f64 = 0.3;

    fn x(offset: f64) -> [f64; 4] {
        [offset, 25.0, TEX, 60.8]
    }

    fn params(kex: f64, pb: f64) -> [f64; 8] {
        [kex, pb, 118.0, 122.0, 1.5, 1.5, 10.0, 30.0]
    }

    #[test]
    fn test_far_off_resonance_decays_with_r1() {
        let expected = (-TEX * 1.5).exp();
        assert_relative_eq!(
            no_exchange(&[118.0, 1.5, 10.0], &x(160.0)),
            expected,
            max_relative = 1e-3
        );
        assert_relative_eq!(exact0(&params(0.0, 0.0), &x(160.0)), expected, max_relative = 1e-3);
    }

    #[test]
    fn test_saturation_at_resonance() {
        let on = no_exchange(&[118.0, 1.5, 10.0], &x(118.0));
        assert!(on < 0.01);
    }

    #[test]
    fn test_minor_state_dip() {
        // the minor state only shows up with exchange
        let free = perturbation(&params(0.0, 0.0), &x(122.0));
        let exchanging = perturbation(&params(200.0, 0.05), &x(122.0));
        assert!(exchanging < free);
        let exact = exact0(&params(200.0, 0.05), &x(122.0));
        assert!(exact < free);
    }

    #[test]
    fn test_b1_distribution_is_weighted_mean() {
        let p = params(300.0, 0.05);
        let value = b1_distribution(&p, &x(119.0));
        let low = perturbation(&p, &[119.0, 25.0 * 0.6, TEX, 60.8]);
        let high = perturbation(&p, &[119.0, 25.0 * 1.4, TEX, 60.8]);
        assert!(value >= low.min(high) && value <= low.max(high));
    }

    #[test]
    fn test_exact_forms_agree() {
        // away from both resonances the two forms differ mainly by the A population
        let p = params(400.0, 0.05);
        for offset in [112.0, 116.0, 120.0, 126.0] {
            let reference = exact0(&p, &x(offset));
            assert_relative_eq!(exact1(&p, &x(offset)), reference, epsilon = 0.06);
        }
    }
}
