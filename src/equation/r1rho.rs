//! Rotating-frame relaxation, `x = [offset (ppm), b1 (Hz), tex (s), field_x (MHz)]`
//!
//! The exchange equations share the parameter list
//! `[Kex, Pb, deltaA0, deltaB0, R1A, R1B, R2A, R2B]` with chemical shifts in ppm.
//! The rate expressions are also used by the CEST equations.

use super::bloch::TwoSite;
use super::peaks::{find_dips, Dip};
use super::{mean, min_max, EquationType, Scope, TWO_PI};
use crate::data::{Experiment, ExperimentKind};
use crate::fit::FitOptions;

pub(crate) const NOEX_PARS: &[&str] = &["deltaA0", "R1A", "R2A"];
pub(crate) const NOEX_SCOPES: &[Scope] = &[Scope::RESIDUE_TEMP; 3];

pub(crate) const EXCHANGE_PARS: &[&str] = &[
    "Kex", "Pb", "deltaA0", "deltaB0", "R1A", "R1B", "R2A", "R2B",
];
pub(crate) const EXCHANGE_SCOPES: &[Scope] = &[
    Scope::GROUP,
    Scope::GROUP,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
    Scope::RESIDUE_TEMP,
];
pub(crate) const R1_LINKED: &[(usize, usize)] = &[(5, 4)];
pub(crate) const RATES_LINKED: &[(usize, usize)] = &[(5, 4), (7, 6)];

pub static EQUATIONS: [EquationType; 6] = [
    EquationType::new(
        "R1RHOPERTURBATIONNOEX",
        ExperimentKind::R1rho,
        NOEX_PARS,
        NOEX_SCOPES,
        &[],
        None,
        perturbation_no_exchange,
        noex_guess,
        noex_bounds,
    ),
    EquationType::new(
        "R1RHOPERTURBATION",
        ExperimentKind::R1rho,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        perturbation,
        exchange_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "R1RHOBALDWINKAY",
        ExperimentKind::R1rho,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        baldwin_kay,
        exchange_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "R1RHOLAGUERRE",
        ExperimentKind::R1rho,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        RATES_LINKED,
        Some(0),
        laguerre,
        exchange_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "R1RHOEXACT",
        ExperimentKind::R1rho,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        exact,
        exchange_guess,
        exchange_bounds,
    ),
    EquationType::new(
        "R1RHOEXACT0",
        ExperimentKind::R1rho,
        EXCHANGE_PARS,
        EXCHANGE_SCOPES,
        R1_LINKED,
        Some(0),
        exact0,
        exchange_guess,
        exchange_bounds,
    )
    .with_tex(),
];

/// Two-site system for the exchange parameter list, projected into its domain
pub(crate) fn two_site(params: &[f64], x: &[f64]) -> TwoSite {
    let offset = x[0];
    let scale = TWO_PI * x[3];
    TwoSite {
        kex: params[0].max(0.0),
        pb: params[1].clamp(0.0, 1.0),
        delta_a: scale * (params[2] - offset),
        delta_b: scale * (params[3] - offset),
        omega1: TWO_PI * x[1],
        r1a: params[4],
        r1b: params[5],
        r2a: params[6],
        r2b: params[7],
    }
}

/// A single site without exchange, for `[deltaA0, R1A, R2A]`
pub(crate) fn one_site(params: &[f64], x: &[f64]) -> TwoSite {
    let delta_a = TWO_PI * x[3] * (params[0] - x[0]);
    TwoSite {
        kex: 0.0,
        pb: 0.0,
        delta_a,
        delta_b: delta_a,
        omega1: TWO_PI * x[1],
        r1a: params[1],
        r1b: params[1],
        r2a: params[2],
        r2b: params[2],
    }
}

/// Effective-field quantities shared by the approximate expressions
pub(crate) struct Tilt {
    pub pa: f64,
    pub pb: f64,
    pub omega1_sq: f64,
    pub we_a_sq: f64,
    pub we_b_sq: f64,
    /// Population-averaged offset
    pub omega_bar: f64,
    pub we_sq: f64,
    pub dw: f64,
}

impl Tilt {
    pub fn new(s: &TwoSite) -> Self {
        let pb = s.pb;
        let pa = 1.0 - pb;
        let omega1_sq = s.omega1 * s.omega1;
        let omega_bar = pa * s.delta_a + pb * s.delta_b;
        Tilt {
            pa,
            pb,
            omega1_sq,
            we_a_sq: omega1_sq + s.delta_a * s.delta_a,
            we_b_sq: omega1_sq + s.delta_b * s.delta_b,
            omega_bar,
            we_sq: omega1_sq + omega_bar * omega_bar,
            dw: s.delta_b - s.delta_a,
        }
    }

    /// cos² of the population-averaged tilt angle
    pub fn cos2(&self) -> f64 {
        self.omega_bar * self.omega_bar / self.we_sq
    }
}

pub(crate) fn no_exchange_rate(s: &TwoSite) -> f64 {
    let omega1_sq = s.omega1 * s.omega1;
    let sin2t = omega1_sq / (omega1_sq + s.delta_a * s.delta_a);
    (1.0 - sin2t) * s.r1a + sin2t * s.r2a
}

/// Trott–Palmer perturbation rate
pub(crate) fn trott_rate(s: &TwoSite) -> f64 {
    let t = Tilt::new(s);
    let k1 = t.pb * s.kex;
    let km1 = t.pa * s.kex;
    let d_r = (s.r2b - s.r2a).abs();
    let sin2t = t.omega1_sq / t.we_a_sq;

    let rex = if k1 == 0.0 {
        0.0
    } else {
        let x = (t.dw * t.dw + d_r * d_r) * km1 + d_r * (t.we_a_sq + km1 * km1);
        let y = km1 * (t.we_b_sq + (km1 + d_r).powi(2)) + d_r * t.omega1_sq;
        k1 * x / y
    };
    (1.0 - sin2t) * s.r1a + sin2t * s.r2a + sin2t * rex
}

/// Baldwin–Kay first-order rate, exact for unequal intrinsic R2
pub(crate) fn baldwin_kay_rate(s: &TwoSite) -> f64 {
    let t = Tilt::new(s);
    let k = s.kex.max(1.0e-6);
    let k2 = k * k;
    let sin2t = t.omega1_sq / t.we_sq;
    let cos2t = 1.0 - sin2t;
    let tan2t = sin2t / cos2t;
    let d_r = s.r2b - s.r2a;
    let da2 = s.delta_a * s.delta_a;
    let db2 = s.delta_b * s.delta_b;

    let f1p = t.pa * t.pb * t.dw * t.dw;
    let f2p = k2 + t.omega1_sq + da2 * db2 / (t.omega_bar * t.omega_bar);
    let dp = k2 + t.we_a_sq * t.we_b_sq / t.we_sq;
    let f1 = t.pb * (t.we_a_sq + k2 + d_r * t.pa * k);
    let f2 = 2.0 * k + t.omega1_sq / k + d_r * t.pa;
    let f3 = 3.0 * t.pb * k
        + (2.0 * t.pa * k + t.omega1_sq / k + d_r + d_r * t.pb * t.pb * k2 / t.we_a_sq)
            * (t.we_a_sq / t.omega1_sq);

    let denominator = dp + d_r * f3 * sin2t;
    let c1 = (f2p + (f1p + d_r * (f3 - f2)) * tan2t) / denominator;
    let c2 = (dp / sin2t - f2p / tan2t - f1p + d_r * f2) / denominator;
    let rex = (f1p * k + d_r * f1) / denominator;
    c1 * s.r1a * cos2t + sin2t * (c2 * s.r2a + rex)
}

/// Miloushev–Palmer (Laguerre) rate for general population ratios
pub(crate) fn laguerre_rate(s: &TwoSite) -> f64 {
    let t = Tilt::new(s);
    let k = s.kex;
    let r1_bar = t.pa * s.r1a + t.pb * s.r1b;
    let r2_bar = t.pa * s.r2a + t.pb * s.r2b;
    let sin2t = t.omega1_sq / t.we_sq;

    let x = t.pa * t.pb * t.dw * t.dw * sin2t;
    let y = t.we_a_sq * t.we_b_sq / t.we_sq + k * k;
    let z = x
        * (1.0
            + 2.0 * k * k * (t.pa * t.we_a_sq + t.pb * t.we_b_sq)
                / (t.we_a_sq * t.we_b_sq + t.we_sq * k * k));
    let rex = if x == 0.0 { 0.0 } else { k * x / (y - z) };
    (1.0 - sin2t) * r1_bar + sin2t * r2_bar + rex
}

pub fn perturbation_no_exchange(params: &[f64], x: &[f64]) -> f64 {
    no_exchange_rate(&one_site(params, x))
}

pub fn perturbation(params: &[f64], x: &[f64]) -> f64 {
    trott_rate(&two_site(params, x))
}

pub fn baldwin_kay(params: &[f64], x: &[f64]) -> f64 {
    baldwin_kay_rate(&two_site(params, x))
}

pub fn laguerre(params: &[f64], x: &[f64]) -> f64 {
    laguerre_rate(&two_site(params, x))
}

/// A-site eigenmode of the full Bloch–McConnell matrix, located from the Trott–Palmer rate
pub(crate) fn exact_rate(s: &TwoSite) -> f64 {
    s.rate_near(trott_rate(s))
}

pub fn exact(params: &[f64], x: &[f64]) -> f64 {
    exact_rate(&two_site(params, x))
}

/// Decay of spin-locked A magnetization from the full propagator over `tex`
pub fn exact0(params: &[f64], x: &[f64]) -> f64 {
    let tex = x[2];
    if tex <= 0.0 {
        return f64::NAN;
    }
    two_site(params, x).spin_lock_rate(tex)
}

/// Which kind of offset profile a guess is derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Profile {
    /// Normalized intensities that dip at resonance
    Cest,
    /// Rates that peak at resonance
    R1rho,
}

/// Heuristic starting values from the dips of an offset profile
pub(crate) struct ProfileGuess {
    pub kex: f64,
    pub pb: f64,
    pub delta_a: f64,
    pub delta_b: f64,
    pub r1: f64,
    pub r2: f64,
}

impl ProfileGuess {
    pub fn new(experiment: &Experiment, profile: Profile) -> Self {
        let offsets = experiment.primary_x();
        let y = experiment.y();
        let dips = find_dips(&offsets, y, profile == Profile::R1rho);
        let (min_y, max_y) = min_max(y);
        let field_x = experiment.field_x();

        let delta_a = dips.first().map(|d| d.position).unwrap_or(mean(&offsets));
        let delta_b = dips.get(1).map(|d| d.position).unwrap_or(delta_a + 2.0);

        let (pb_scale, kex_scale) = match profile {
            Profile::Cest => (4.0, 1.0),
            Profile::R1rho => (40.0, 3.0),
        };
        let pb = match (dips.first(), dips.get(1)) {
            (Some(major), Some(minor)) => (minor.depth / major.depth / pb_scale).clamp(0.001, 0.25),
            _ => 0.1,
        };
        let mean_width_hz = if dips.is_empty() {
            field_x
        } else {
            dips.iter().map(|d| d.width).sum::<f64>() / dips.len() as f64 * field_x
        };
        let kex = (mean_width_hz / kex_scale).clamp(10.0, 1.0e4);

        let (r1, r2) = match profile {
            Profile::Cest => {
                let tex = experiment.tex().unwrap_or(0.0);
                let r1 = if tex > 0.0 && max_y > 0.0 && max_y < 1.0 {
                    -max_y.ln() / tex
                } else {
                    1.0
                };
                let width_hz = dips.first().map(|d| d.width * field_x).unwrap_or(10.0);
                (r1, width_hz.clamp(2.0, 100.0))
            }
            Profile::R1rho => (min_y.max(0.1), (0.9 * max_y).max(0.2)),
        };

        ProfileGuess {
            kex,
            pb,
            delta_a,
            delta_b,
            r1,
            r2,
        }
    }
}

/// Bounds for R1 from the intensity baseline it produces over `tex`
pub(crate) fn r1_boundaries(r1: f64, tex: f64, delta: f64) -> (f64, f64) {
    let baseline = (-r1 * tex).exp();
    let lower = -(baseline + delta).ln() / tex;
    let upper = -(baseline - delta).max(0.01).ln() / tex;
    (lower.max(0.0), upper)
}

pub(crate) fn exchange_guess_for(experiment: &Experiment, profile: Profile) -> Vec<f64> {
    let g = ProfileGuess::new(experiment, profile);
    vec![
        g.kex, g.pb, g.delta_a, g.delta_b, g.r1, g.r1, g.r2, g.r2,
    ]
}

pub(crate) fn noex_guess_for(experiment: &Experiment, profile: Profile) -> Vec<f64> {
    let g = ProfileGuess::new(experiment, profile);
    vec![g.delta_a, g.r1, g.r2]
}

/// Bounds shared by the R1rho and CEST equations, for either parameter list
pub(crate) fn profile_bounds(
    guess: &[f64],
    experiment: &Experiment,
    profile: Profile,
) -> (Vec<f64>, Vec<f64>) {
    let offsets = experiment.primary_x();
    let dips: Vec<Dip> = find_dips(&offsets, experiment.y(), profile == Profile::R1rho);
    let (min_offset, max_offset) = min_max(&offsets);
    let half_width = dips
        .first()
        .map(|d| 0.5 * d.width)
        .unwrap_or(0.5)
        .max(0.1);

    let r1_bounds = |r1: f64| match (profile, experiment.tex()) {
        (Profile::Cest, Some(tex)) if tex > 0.0 => r1_boundaries(r1, tex, 0.1),
        _ => (0.0, (4.0 * r1).max(1.0)),
    };
    let r2_bounds = |r2: f64| (0.1, (4.0 * r2).max(250.0));
    let shift_a = |g: f64| (g - half_width, g + half_width);
    let shift_b = |g: f64| (min_offset.min(g) - 1.0, max_offset.max(g) + 1.0);

    let bounds: Vec<(f64, f64)> = if guess.len() == 3 {
        vec![shift_a(guess[0]), r1_bounds(guess[1]), r2_bounds(guess[2])]
    } else {
        vec![
            (1.0, (4.0 * guess[0]).max(2.0)),
            (0.0, 0.5),
            shift_a(guess[2]),
            shift_b(guess[3]),
            r1_bounds(guess[4]),
            r1_bounds(guess[5]),
            r2_bounds(guess[6]),
            r2_bounds(guess[7]),
        ]
    };
    bounds.into_iter().unzip()
}

fn noex_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    noex_guess_for(experiment, Profile::R1rho)
}

fn exchange_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    exchange_guess_for(experiment, Profile::R1rho)
}

fn noex_bounds(
    guess: &[f64],
    experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    profile_bounds(guess, experiment, Profile::R1rho)
}

fn exchange_bounds(
    guess: &[f64],
    experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    profile_bounds(guess, experiment, Profile::R1rho)
}
