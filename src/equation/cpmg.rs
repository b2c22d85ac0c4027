//! CPMG relaxation dispersion
//!
//! Independent variables: `[nu_cpmg (Hz), field_x (MHz), field_h (MHz), tau (s)]`.
//! Chemical-shift differences are in ppm of the observed nucleus (or 1H for the
//! multiple-quantum proton shift) and are converted to rad/s with the field.

use std::f64::consts::{FRAC_1_SQRT_2, SQRT_2};

use nalgebra::Complex;

use super::{mean, mid_x, min_max, scaled_bounds, EquationType, Scope, TWO_PI};
use crate::data::{Experiment, ExperimentKind};
use crate::fit::FitOptions;

const NOEX_PARS: &[&str] = &["R2"];
const NOEX_SCOPES: &[Scope] = &[Scope::RESIDUE_FIELD_B1];

const FAST_PARS: &[&str] = &["Kex", "R2", "dPPMmin"];
const FAST_SCOPES: &[Scope] = &[Scope::GROUP, Scope::RESIDUE_FIELD_B1, Scope::RESIDUE_TEMP];

const SLOW_PARS: &[&str] = &["Kex", "pA", "R2", "dPPM"];
const SLOW_SCOPES: &[Scope] = &[
    Scope::GROUP,
    Scope::GROUP,
    Scope::RESIDUE_FIELD_B1,
    Scope::RESIDUE_TEMP,
];

const MQ_PARS: &[&str] = &["Kex", "pA", "R2", "deltaCPPM", "deltaHPPM"];
const MQ_SCOPES: &[Scope] = &[
    Scope::GROUP,
    Scope::GROUP,
    Scope::RESIDUE_FIELD_B1,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
];

pub static EQUATIONS: [EquationType; 4] = [
    EquationType::new(
        "NOEX",
        ExperimentKind::Cpmg,
        NOEX_PARS,
        NOEX_SCOPES,
        &[],
        None,
        noex,
        noex_guess,
        noex_bounds,
    ),
    EquationType::new(
        "CPMGFAST",
        ExperimentKind::Cpmg,
        FAST_PARS,
        FAST_SCOPES,
        &[],
        Some(0),
        fast,
        fast_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "CPMGSLOW",
        ExperimentKind::Cpmg,
        SLOW_PARS,
        SLOW_SCOPES,
        &[],
        Some(0),
        slow,
        slow_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "CPMGMQ",
        ExperimentKind::Cpmg,
        MQ_PARS,
        MQ_SCOPES,
        &[],
        Some(0),
        multiple_quantum,
        mq_guess,
        exchange_bounds,
    ),
];

/// No exchange: a flat dispersion profile
pub fn noex(params: &[f64], _x: &[f64]) -> f64 {
    params[0]
}

/// Fast-exchange (Luz–Meiboom) limit
pub fn fast(params: &[f64], x: &[f64]) -> f64 {
    let kex = params[0];
    let r2 = params[1];
    let dppm_min = params[2];
    if kex <= 0.0 {
        return r2;
    }
    let tau_cp = 1.0 / (2.0 * x[0]);
    let dw = TWO_PI * dppm_min * x[1];
    let rex = dw * dw / 4.0 / kex;
    r2 + rex * (1.0 - 2.0 * (0.5 * kex * tau_cp).tanh() / (kex * tau_cp))
}

/// Carver–Richards two-state exchange, valid for all timescales
pub fn slow(params: &[f64], x: &[f64]) -> f64 {
    let kex = params[0].max(0.0);
    let pa = params[1].clamp(0.5, 1.0);
    let r2 = params[2];
    let dppm = params[3];

    let pb = 1.0 - pa;
    let pd = pa - pb;
    let dw = TWO_PI * dppm * x[1];
    let tau_cp = 1.0 / (2.0 * x[0]);

    let psi = (pd * kex).powi(2) - dw * dw + 4.0 * pa * pb * kex * kex;
    let zeta = -2.0 * dw * kex * pd;
    let eta1 = psi.hypot(zeta);
    if eta1 == 0.0 {
        return r2;
    }
    let eta_p = FRAC_1_SQRT_2 * tau_cp * (eta1 + psi).max(0.0).sqrt();
    let eta_m = FRAC_1_SQRT_2 * tau_cp * (eta1 - psi).max(0.0).sqrt();
    let d1 = (psi + 2.0 * dw * dw) / eta1;
    let dp = 0.5 * (d1 + 1.0);
    let dm = 0.5 * (d1 - 1.0);

    // acosh(z) ~ ln(2z) once cosh overflows
    let acosh = if eta_p < 300.0 {
        (dp * eta_p.cosh() - dm * eta_m.cos()).max(1.0).acosh()
    } else {
        eta_p + dp.max(f64::MIN_POSITIVE).ln()
    };
    r2 + 0.5 * (kex - acosh / tau_cp)
}

/// Korzhnev multiple-quantum CPMG dispersion
pub fn multiple_quantum(params: &[f64], x: &[f64]) -> f64 {
    let kex = params[0].max(0.0);
    let pa = params[1].clamp(0.5, 1.0);
    let r2 = params[2];
    let dc_ppm = params[3];
    let dh_ppm = params[4];

    let pb = 1.0 - pa;
    let nu = x[0];
    let field_x = x[1];
    let field_h = x[2];
    let tau = x[3];

    let dc = TWO_PI * dc_ppm * field_x;
    let dh = if field_h > 1.0e-6 {
        TWO_PI * dh_ppm * field_h
    } else {
        0.0
    };
    let delta = 1.0 / (4.0 * nu);

    let num1 = Complex::new((pa - pb) * kex, dh);
    let zeta = num1 * (-2.0 * dc);
    let psi = num1 * num1 - dc * dc + 4.0 * pa * pb * kex * kex;
    let num2 = (psi * psi + zeta * zeta).sqrt();
    if num2.norm() == 0.0 {
        return r2;
    }
    let eta_plus = (num2 + psi).sqrt() * (SQRT_2 * delta);
    let eta_minus = (num2 - psi).sqrt() * (SQRT_2 * delta);
    let ratio = (psi + 2.0 * dc * dc) / num2;
    let d_plus = (ratio + 1.0) * 0.5;
    let d_minus = (ratio - 1.0) * 0.5;
    let num3 = d_plus * eta_plus.cosh() - d_minus * eta_minus.cos();
    let acosh = (num3 + (num3 + 1.0).sqrt() * (num3 - 1.0).sqrt()).ln();
    let lambda1 = (acosh / (-2.0 * delta) + kex) * 0.5 + r2;

    if kex == 0.0 || tau <= 1.0e-6 {
        return lambda1.re;
    }

    let d_p = Complex::new(dh + dc, kex);
    let d_m = Complex::new(dh + dc, -kex);
    let z_p = Complex::new(dh - dc, kex);
    let z_m = Complex::new(dh - dc, -kex);
    let num4 = Complex::new(0.0, kex * (pa * pb).sqrt());

    let m_z = -((d_m - (d_m * delta).sin() / ((d_m + z_m) * delta).sin() * (2.0 * dc))
        * (num4 / (d_m * z_m)));
    let m_d = (z_p + (z_p * delta).sin() / ((d_p + z_p) * delta).sin() * (2.0 * dc))
        * (num4 / (d_p * z_p));
    let q = (-(m_d * m_d) + 1.0 + m_d * m_z - m_z * m_z + (m_d + m_z) * (0.5 * (pb / pa).sqrt()))
        .re;

    if q > 0.0 && q.is_finite() {
        lambda1.re - q.ln() / tau
    } else {
        lambda1.re
    }
}

/// Exchange contribution: the dispersion amplitude between slow and fast pulsing
pub fn rex(equation: &EquationType, params: &[f64], experiment: &Experiment) -> f64 {
    let tau = experiment.tex().unwrap_or(0.0);
    let slow_pulsing = [10.0, experiment.field_x(), experiment.field_h(), tau];
    let fast_pulsing = [1.0e4, experiment.field_x(), experiment.field_h(), tau];
    equation.evaluate(params, &slow_pulsing) - equation.evaluate(params, &fast_pulsing)
}

struct DispersionGuess {
    r2: f64,
    kex: f64,
    pa: f64,
    dppm: f64,
    dppm_min: f64,
}

impl DispersionGuess {
    fn new(experiment: &Experiment, options: &FitOptions) -> Self {
        let y = experiment.y();
        let nu = experiment.primary_x();
        let (min_y, max_y) = min_max(y);
        let r2 = 0.95 * min_y;
        let rex = (max_y - min_y).max(0.0);

        let nu_mid = mid_x(&nu, y);
        let kex = if nu_mid > 0.0 {
            let tau_mid = 1.0 / (2.0 * nu_mid);
            1.915 / (0.5 * tau_mid)
        } else {
            options.cpmg_max_freq / 2.0
        }
        .min(0.9 * options.cpmg_max_freq);

        let pa = 0.95;
        let scale = TWO_PI * experiment.field_x();
        let (dppm, dppm_min) = if scale > 0.0 {
            (
                (rex * kex / (pa * (1.0 - pa))).sqrt() / scale,
                (4.0 * rex * kex).sqrt() / scale,
            )
        } else {
            (0.0, 0.0)
        };
        DispersionGuess {
            r2,
            kex,
            pa,
            dppm,
            dppm_min,
        }
    }
}

fn noex_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    vec![mean(experiment.y())]
}

fn fast_guess(experiment: &Experiment, options: &FitOptions) -> Vec<f64> {
    let g = DispersionGuess::new(experiment, options);
    vec![g.kex, g.r2, g.dppm_min]
}

fn slow_guess(experiment: &Experiment, options: &FitOptions) -> Vec<f64> {
    let g = DispersionGuess::new(experiment, options);
    vec![g.kex, g.pa, g.r2, g.dppm]
}

fn mq_guess(experiment: &Experiment, options: &FitOptions) -> Vec<f64> {
    let g = DispersionGuess::new(experiment, options);
    vec![g.kex, g.pa, g.r2, g.dppm, 0.1 * g.dppm]
}

fn noex_bounds(
    guess: &[f64],
    _experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    scaled_bounds(guess)
}

fn exchange_bounds(
    guess: &[f64],
    _experiment: &Experiment,
    options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    let (mut lower, mut upper) = scaled_bounds(guess);
    upper[0] = upper[0].min(options.cpmg_max_freq);
    // pA, when present, is the second parameter
    if guess.len() > 3 {
        lower[1] = 0.5;
        upper[1] = 0.999;
    }
    (lower, upper)
}
