use std::fmt;

use cached::proc_macro::cached;
use cached::UnboundCache;
use serde::{Deserialize, Serialize};

use super::ModelFreeError;

pub const MU0: f64 = 4.0e-7 * std::f64::consts::PI;
pub const PLANCK: f64 = 1.0546e-34;
pub const GAMMA_H: f64 = 2.6752218744e8;
pub const GAMMA_N: f64 = -2.7116e7;
pub const GAMMA_C: f64 = 6.72828e7;
pub const GAMMA_D: f64 = 4.1065e7;
/// N-H bond length in m
pub const R_HN: f64 = 1.02e-10;
/// C-H (and C-D) bond length in m
pub const R_HC: f64 = 1.09e-10;
/// Chemical shift anisotropy of the heteronucleus
pub const SIGMA: f64 = -172.0e-6;
/// Deuterium quadrupolar coupling constant in rad/s
pub const QCC: f64 = std::f64::consts::PI * 167.0e3 / 2.0;
pub const QCC2: f64 = QCC * QCC;

/// Spectral density indices of the dipolar frequency set
const S: usize = 1;
const I_MINUS_S: usize = 2;
const I: usize = 3;
const I_PLUS_S: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Nucleus {
    H,
    N,
    C,
    D,
}

impl Nucleus {
    /// Gyromagnetic ratio in rad s-1 T-1
    pub fn gamma(&self) -> f64 {
        match self {
            Nucleus::H => GAMMA_H,
            Nucleus::N => GAMMA_N,
            Nucleus::C => GAMMA_C,
            Nucleus::D => GAMMA_D,
        }
    }

    /// Larmor frequency of this nucleus relative to 1H
    pub fn frequency_ratio(&self) -> f64 {
        (self.gamma() / GAMMA_H).abs()
    }
}

impl fmt::Display for Nucleus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Nucleus::H => "H",
            Nucleus::N => "N",
            Nucleus::C => "C",
            Nucleus::D => "D",
        };
        write!(f, "{}", symbol)
    }
}

fn bond_length(i: Nucleus, s: Nucleus) -> Option<f64> {
    match (i, s) {
        (Nucleus::H, Nucleus::N) | (Nucleus::N, Nucleus::H) => Some(R_HN),
        (Nucleus::H, Nucleus::C)
        | (Nucleus::C, Nucleus::H)
        | (Nucleus::D, Nucleus::C)
        | (Nucleus::C, Nucleus::D) => Some(R_HC),
        _ => None,
    }
}

/// Relaxation rate expressions for one spin pair at one spectrometer field
///
/// For a dipolar pair `I-S` the spectral densities are sampled at
/// `[0, wS, wI - wS, wI, wI + wS]`. For deuterium (`I = D`) they are sampled at
/// `[0, wD, 2 wD]`.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxEquations {
    sf: f64,
    gamma_i: f64,
    gamma_s: f64,
    d2: f64,
    c2: f64,
    w_i: f64,
    w_s: f64,
    omegas: Vec<f64>,
}

impl RelaxEquations {
    /// # Arguments
    ///
    /// * `sf` - 1H spectrometer frequency in Hz
    /// * `i`, `s` - The observed spin pair, e.g. `H, N` for backbone amides
    pub fn new(sf: f64, i: Nucleus, s: Nucleus) -> Result<Self, ModelFreeError> {
        let r = bond_length(i, s)
            .ok_or_else(|| ModelFreeError::UnsupportedPair(i.to_string(), s.to_string()))?;
        let gamma_i = i.gamma();
        let gamma_s = s.gamma();
        let (w_i, w_s) = if i == Nucleus::D {
            let base = sf * 2.0 * std::f64::consts::PI / GAMMA_H;
            (base * gamma_i, base * gamma_s)
        } else {
            let w_i = sf * 2.0 * std::f64::consts::PI;
            (w_i, w_i * gamma_s / gamma_i)
        };
        let d = MU0 * (gamma_i * gamma_s * PLANCK) / (4.0 * std::f64::consts::PI * r.powi(3));
        let c = w_s * SIGMA / 3.0_f64.sqrt();
        let omegas = if i == Nucleus::D {
            vec![0.0, w_i, 2.0 * w_i]
        } else {
            vec![0.0, w_s, w_i - w_s, w_i, w_i + w_s]
        };
        Ok(RelaxEquations {
            sf,
            gamma_i,
            gamma_s,
            d2: d * d,
            c2: c * c,
            w_i,
            w_s,
            omegas,
        })
    }

    pub fn sf(&self) -> f64 {
        self.sf
    }

    /// Frequencies (rad/s) at which the spectral density is needed
    pub fn omegas(&self) -> &[f64] {
        &self.omegas
    }

    pub fn w_i(&self) -> f64 {
        self.w_i
    }

    pub fn w_s(&self) -> f64 {
        self.w_s
    }

    pub fn gamma_i(&self) -> f64 {
        self.gamma_i
    }

    pub fn gamma_s(&self) -> f64 {
        self.gamma_s
    }

    /// Squared dipolar coupling constant
    pub fn d2(&self) -> f64 {
        self.d2
    }

    /// Squared CSA constant
    pub fn c2(&self) -> f64 {
        self.c2
    }

    pub fn r1(&self, j: &[f64]) -> f64 {
        self.d2 / 4.0 * (j[I_MINUS_S] + 3.0 * j[S] + 6.0 * j[I_PLUS_S]) + self.c2 * j[S]
    }

    pub fn r2(&self, j: &[f64], rex: f64) -> f64 {
        let dipolar = self.d2 / 8.0
            * (4.0 * j[0] + j[I_MINUS_S] + 3.0 * j[S] + 6.0 * j[I] + 6.0 * j[I_PLUS_S]);
        let csa = self.c2 / 6.0 * (4.0 * j[0] + 3.0 * j[S]);
        dipolar + csa + rex
    }

    pub fn noe(&self, j: &[f64]) -> f64 {
        let r1 = self.r1(j);
        1.0 + (self.d2 / (4.0 * r1)) * (self.gamma_i / self.gamma_s)
            * (6.0 * j[I_PLUS_S] - j[I_MINUS_S])
    }

    // Deuterium rates, `j` sampled at [0, wD, 2 wD]

    pub fn r1_d(&self, j: &[f64]) -> f64 {
        3.0 * QCC2 * (j[1] + 4.0 * j[2])
    }

    /// R1rho of deuterium
    pub fn r2_d(&self, j: &[f64]) -> f64 {
        1.5 * QCC2 * (3.0 * j[0] + 5.0 * j[1] + 2.0 * j[2])
    }

    pub fn rq_d(&self, j: &[f64]) -> f64 {
        9.0 * QCC2 * j[1]
    }

    pub fn rap_d(&self, j: &[f64]) -> f64 {
        1.5 * QCC2 * (3.0 * j[0] + j[1] + 2.0 * j[2])
    }
}

/// Shared [RelaxEquations], keyed by the field rounded to whole MHz
#[cached(
    ty = "UnboundCache<(i64, Nucleus, Nucleus), RelaxEquations>",
    create = "{ UnboundCache::with_capacity(32) }",
    convert = r#"{ ((sf / 1.0e6).round() as i64, i, s) }"#,
    result = "true"
)]
pub fn relax_equations(sf: f64, i: Nucleus, s: Nucleus) -> Result<RelaxEquations, ModelFreeError> {
    RelaxEquations::new(sf, i, s)
}
