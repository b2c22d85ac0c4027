//! Isotropic Lipari–Szabo spectral density models
//!
//! Correlation times are in ns. Every model can optionally fit the overall tumbling
//! time (a leading `Tau_e` parameter, bounded to a fraction around the target) and a
//! field-independent exchange contribution (a trailing `Rex` parameter).
//!
//! Deuterium models (names prefixed with `D`) describe a methyl deuteron, whose
//! order parameter is reduced by the fast rotation about the methyl axis. The fitted
//! order parameter is then that of the axis and is divided by [METHYL_ORDER_SCALE].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ModelFreeError;

/// Upper limit for fast internal motions and lower limit for slow ones, in ns
pub const SLOW_LIMIT: f64 = 0.15;

/// `1 / P2(cos 109.5°)^2`, the methyl-axis reduction of a C-D order parameter
pub const METHYL_ORDER_SCALE: f64 = 9.0;

const NS: f64 = 1.0e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Order parameter only
    #[serde(rename = "1")]
    M1,
    /// Order parameter and fast internal motion
    #[serde(rename = "1f")]
    M1f,
    /// Order parameter and slow internal motion
    #[serde(rename = "1s")]
    M1s,
    /// Two order parameters, slow internal motion
    #[serde(rename = "2s")]
    M2s,
    /// Two order parameters, fast internal motion
    #[serde(rename = "2f")]
    M2f,
    /// Two order parameters with fast and slow internal motions
    #[serde(rename = "2sf")]
    M2sf,
    /// Fast and slow internal motions with the fast order parameter fixed at its
    /// rigid value
    #[serde(rename = "1sf")]
    M1sf,
    /// The 2sf density evaluated directly in seconds
    #[serde(rename = "2sfx")]
    M2sfx,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::M1 => "1",
            ModelKind::M1f => "1f",
            ModelKind::M1s => "1s",
            ModelKind::M2s => "2s",
            ModelKind::M2f => "2f",
            ModelKind::M2sf => "2sf",
            ModelKind::M1sf => "1sf",
            ModelKind::M2sfx => "2sfx",
        }
    }

    fn core_names(&self) -> &'static [&'static str] {
        match self {
            ModelKind::M1 => &["Sf2"],
            ModelKind::M1f => &["Sf2", "Tau_f"],
            ModelKind::M1s => &["Ss2", "Tau_s"],
            ModelKind::M2s => &["Sf2", "Tau_s", "Ss2"],
            ModelKind::M2f => &["Sf2", "Tau_f", "Ss2"],
            ModelKind::M2sf | ModelKind::M2sfx => &["Sf2", "Tau_f", "Ss2", "Tau_s"],
            ModelKind::M1sf => &["Tau_f", "Ss2", "Tau_s"],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ModelKind {
    type Err = ModelFreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches("model") {
            "1" => Ok(ModelKind::M1),
            "1f" => Ok(ModelKind::M1f),
            "1s" => Ok(ModelKind::M1s),
            "2s" => Ok(ModelKind::M2s),
            "2f" => Ok(ModelKind::M2f),
            "2sf" => Ok(ModelKind::M2sf),
            "1sf" => Ok(ModelKind::M1sf),
            "2sfx" => Ok(ModelKind::M2sfx),
            _ => Err(ModelFreeError::UnknownModel(s.to_string())),
        }
    }
}

/// A model-free model with its tumbling time and optional extra parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MfModel {
    pub kind: ModelKind,
    /// Overall tumbling time in ns, fixed unless `fit_tau` is set
    pub tau_m: f64,
    pub fit_tau: bool,
    /// Relative half-width of the `Tau_e` bounds around `tau_m`
    pub tau_fraction: f64,
    pub include_rex: bool,
    /// Divisor applied to the fitted order parameter, 1 except for methyl deuterons
    #[serde(default = "unit_scale")]
    pub order_scale: f64,
}

fn unit_scale() -> f64 {
    1.0
}

/// Lorentzian without the 2/5 prefactor
#[inline]
fn lorentz(omega: f64, tau: f64) -> f64 {
    tau / (1.0 + omega * omega * tau * tau)
}

/// Correlation time of two motions acting together
#[inline]
fn combined(a: f64, b: f64) -> f64 {
    a * b / (a + b)
}

impl MfModel {
    pub fn new(kind: ModelKind, tau_m: f64) -> Self {
        MfModel {
            kind,
            tau_m,
            fit_tau: false,
            tau_fraction: 0.25,
            include_rex: false,
            order_scale: 1.0,
        }
    }

    /// Build a model from its name, e.g. `"2sf"`, or `"D2sf"` for a methyl deuteron
    pub fn build(
        name: &str,
        fit_tau: bool,
        tau_m: f64,
        tau_fraction: f64,
        include_rex: bool,
    ) -> Result<Self, ModelFreeError> {
        let (kind, order_scale) = match name.strip_prefix('D') {
            Some(rest) => (rest.parse()?, METHYL_ORDER_SCALE),
            None => (name.parse()?, 1.0),
        };
        Ok(MfModel {
            kind,
            tau_m,
            fit_tau,
            tau_fraction,
            include_rex,
            order_scale,
        })
    }

    /// Name including the deuterium prefix, e.g. `"D1f"`
    pub fn name(&self) -> String {
        if self.order_scale > 1.0 {
            format!("D{}", self.kind)
        } else {
            self.kind.to_string()
        }
    }

    pub fn with_order_scale(mut self, order_scale: f64) -> Self {
        self.order_scale = order_scale;
        self
    }

    pub fn with_fitted_tau(mut self, tau_fraction: f64) -> Self {
        self.fit_tau = true;
        self.tau_fraction = tau_fraction;
        self
    }

    pub fn with_rex(mut self) -> Self {
        self.include_rex = true;
        self
    }

    pub fn par_names(&self) -> Vec<&'static str> {
        let mut names = Vec::with_capacity(6);
        if self.fit_tau {
            names.push("Tau_e");
        }
        names.extend_from_slice(self.kind.core_names());
        if self.include_rex {
            names.push("Rex");
        }
        names
    }

    pub fn n_pars(&self) -> usize {
        self.kind.core_names().len() + usize::from(self.fit_tau) + usize::from(self.include_rex)
    }

    fn assemble(&self, tau: f64, core: &[f64], rex: f64) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.n_pars());
        if self.fit_tau {
            values.push(tau);
        }
        values.extend_from_slice(core);
        if self.include_rex {
            values.push(rex);
        }
        values
    }

    pub fn start(&self) -> Vec<f64> {
        let t = self.tau_m;
        let core: &[f64] = match self.kind {
            ModelKind::M1 => &[0.9],
            ModelKind::M1f => &[0.9, 0.015],
            ModelKind::M1s => &[0.9, t / 5.0],
            ModelKind::M2s => &[0.9, t / 5.0, 0.9],
            ModelKind::M2f => &[0.9, 0.015, 0.9],
            ModelKind::M2sf | ModelKind::M2sfx => &[0.9, SLOW_LIMIT / 5.0, 0.9, SLOW_LIMIT * 5.0],
            ModelKind::M1sf => &[SLOW_LIMIT / 5.0, 0.9, SLOW_LIMIT * 5.0],
        };
        self.assemble(t, core, 2.0)
    }

    pub fn lower(&self) -> Vec<f64> {
        let core: &[f64] = match self.kind {
            ModelKind::M1 => &[0.0],
            ModelKind::M1f => &[0.0, 0.001],
            ModelKind::M1s => &[0.0, SLOW_LIMIT],
            ModelKind::M2s => &[0.0, SLOW_LIMIT, 0.0],
            ModelKind::M2f => &[0.0, 0.001, 0.0],
            ModelKind::M2sf | ModelKind::M2sfx => &[0.0, 0.001, 0.0, SLOW_LIMIT],
            ModelKind::M1sf => &[0.001, 0.0, SLOW_LIMIT],
        };
        self.assemble(self.tau_m * (1.0 - self.tau_fraction), core, 0.0)
    }

    pub fn upper(&self) -> Vec<f64> {
        let t = self.tau_m;
        let core: &[f64] = match self.kind {
            ModelKind::M1 => &[1.0],
            ModelKind::M1f => &[1.0, SLOW_LIMIT],
            ModelKind::M1s => &[1.0, t / 2.0],
            ModelKind::M2s => &[1.0, t / 2.0, 1.0],
            ModelKind::M2f => &[1.0, SLOW_LIMIT, 1.0],
            ModelKind::M2sf | ModelKind::M2sfx => &[1.0, SLOW_LIMIT, 1.0, t / 2.0],
            ModelKind::M1sf => &[SLOW_LIMIT, 1.0, t / 2.0],
        };
        self.assemble(t * (1.0 + self.tau_fraction), core, 100.0)
    }

    fn check_len(&self, pars: &[f64]) -> Result<(), ModelFreeError> {
        if pars.len() != self.n_pars() {
            return Err(ModelFreeError::ParameterCount {
                model: self.kind.to_string(),
                expected: self.n_pars(),
                found: pars.len(),
            });
        }
        Ok(())
    }

    fn core<'a>(&self, pars: &'a [f64]) -> &'a [f64] {
        let start = usize::from(self.fit_tau);
        &pars[start..start + self.kind.core_names().len()]
    }

    /// Tumbling time in ns for a parameter vector
    pub fn tau(&self, pars: &[f64]) -> f64 {
        if self.fit_tau {
            pars[0]
        } else {
            self.tau_m
        }
    }

    pub fn rex(&self, pars: &[f64]) -> f64 {
        if self.include_rex {
            pars[pars.len() - 1]
        } else {
            0.0
        }
    }

    /// Internal motions must be faster than overall tumbling
    pub fn satisfies_constraints(&self, pars: &[f64]) -> bool {
        let tau_m = self.tau(pars);
        let core = self.core(pars);
        match self.kind {
            ModelKind::M1 => true,
            ModelKind::M1f | ModelKind::M1s | ModelKind::M2s | ModelKind::M2f => core[1] < tau_m,
            ModelKind::M2sf | ModelKind::M2sfx => core[1] < tau_m && core[3] < tau_m,
            ModelKind::M1sf => core[0] < tau_m && core[2] < tau_m,
        }
    }

    /// Spectral density in s/rad at each frequency (rad/s)
    pub fn spectral_density(
        &self,
        omegas: &[f64],
        pars: &[f64],
    ) -> Result<Vec<f64>, ModelFreeError> {
        self.check_len(pars)?;
        let tm = self.tau(pars) * NS;
        let p = self.core(pars);
        // the leading order parameter carries the methyl-axis reduction
        let s_lead = match self.kind {
            ModelKind::M1sf => 1.0 / self.order_scale,
            _ => p[0] / self.order_scale,
        };
        let two_motions = |sf2: f64, tf: f64, ss2: f64, ts: f64, omega: f64| {
            let tau_s = combined(tm, ts);
            let tau_f = combined(tm, tf);
            let tau_fs = combined(tau_s, tf);
            sf2 * ss2 * lorentz(omega, tm)
                + sf2 * (1.0 - ss2) * lorentz(omega, tau_s)
                + (1.0 - sf2) * ss2 * lorentz(omega, tau_f)
                + (1.0 - sf2) * (1.0 - ss2) * lorentz(omega, tau_fs)
        };
        let j = |omega: f64| -> f64 {
            let sum = match self.kind {
                ModelKind::M1 => s_lead * lorentz(omega, tm),
                ModelKind::M1f | ModelKind::M1s => {
                    let tau = combined(tm, p[1] * NS);
                    s_lead * lorentz(omega, tm) + (1.0 - s_lead) * lorentz(omega, tau)
                }
                ModelKind::M2s => {
                    let s2 = s_lead * p[2];
                    let tau = combined(tm, p[1] * NS);
                    s2 * lorentz(omega, tm) + (s_lead - s2) * lorentz(omega, tau)
                }
                ModelKind::M2f => {
                    let ss2 = p[2];
                    let s2 = s_lead * ss2;
                    let tau = combined(tm, p[1] * NS);
                    s2 * lorentz(omega, tm) + (ss2 - s2) * lorentz(omega, tau)
                }
                ModelKind::M2sf => two_motions(s_lead, p[1] * NS, p[2], p[3] * NS, omega),
                ModelKind::M2sfx => {
                    let (tau_m, tf, ts) = (tm, p[1] * NS, p[3] * NS);
                    let (sf2, ss2) = (s_lead, p[2]);
                    let w2 = omega * omega;
                    let slow = tau_m * ts * (tau_m + ts)
                        / (tau_m * tau_m * ts * ts * w2 + (tau_m + ts).powi(2));
                    let fast = tau_m * tf * (tau_m + tf)
                        / (tau_m * tau_m * tf * tf * w2 + (tau_m + tf).powi(2));
                    let t_mfs = tf * (tau_m + ts) + tau_m * ts;
                    let both = tf * tau_m * ts * t_mfs
                        / (tf * tf * tau_m * tau_m * ts * ts * w2 + t_mfs * t_mfs);
                    sf2 * ss2 * lorentz(omega, tau_m)
                        + sf2 * (1.0 - ss2) * slow
                        + (1.0 - sf2) * ss2 * fast
                        + (1.0 - sf2) * (1.0 - ss2) * both
                }
                ModelKind::M1sf => two_motions(s_lead, p[0] * NS, p[1], p[2] * NS, omega),
            };
            0.4 * sum
        };
        Ok(omegas.iter().map(|w| j(*w)).collect())
    }
}
