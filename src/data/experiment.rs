use serde::{Deserialize, Serialize};
use std::fmt;

use super::builder::ExperimentBuilder;

/// The experiment classes a dataset can belong to
///
/// Each class has its own family of competing equations in the
/// [crate::equation] registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentKind {
    /// Carr-Purcell-Meiboom-Gill relaxation dispersion
    Cpmg,
    /// Exponential decay of intensities (R1, R2 and similar rate measurements)
    Exp,
    /// Chemical exchange saturation transfer
    Cest,
    /// Rotating-frame relaxation
    R1rho,
    /// Heteronuclear NOE
    Noe,
}

impl fmt::Display for ExperimentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExperimentKind::Cpmg => "cpmg",
            ExperimentKind::Exp => "exp",
            ExperimentKind::Cest => "cest",
            ExperimentKind::R1rho => "r1rho",
            ExperimentKind::Noe => "noe",
        };
        write!(f, "{}", name)
    }
}

/// One dataset for one residue collected at one set of fixed conditions
///
/// An [Experiment] holds the per-point independent variables, the observed values and
/// (optionally) their uncertainties, together with the fixed conditions the equations
/// need but that are not fitted: spectrometer field, temperature, B1 field and the
/// saturation, spin-lock or constant-time delay.
///
/// Experiments are immutable once built, use [Experiment::builder] to create them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub(crate) kind: ExperimentKind,
    pub(crate) residue: String,
    /// 1H spectrometer frequency in MHz
    pub(crate) field_h: f64,
    /// Frequency of the observed heteronucleus in MHz
    pub(crate) field_x: f64,
    /// Temperature in K
    pub(crate) temperature: f64,
    /// B1 (spin-lock or saturation) field in Hz
    pub(crate) b1_field: Option<f64>,
    /// Saturation time, spin-lock time or CPMG constant-time delay in seconds
    pub(crate) tex: Option<f64>,
    pub(crate) x: Vec<Vec<f64>>,
    pub(crate) y: Vec<f64>,
    pub(crate) err: Option<Vec<f64>>,
}

impl Experiment {
    /// Start building an experiment of the given kind for a residue
    pub fn builder(kind: ExperimentKind, residue: impl Into<String>) -> ExperimentBuilder {
        ExperimentBuilder::new(kind, residue.into())
    }

    pub fn kind(&self) -> ExperimentKind {
        self.kind
    }

    pub fn residue(&self) -> &str {
        &self.residue
    }

    pub fn field_h(&self) -> f64 {
        self.field_h
    }

    pub fn field_x(&self) -> f64 {
        self.field_x
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn b1_field(&self) -> Option<f64> {
        self.b1_field
    }

    pub fn tex(&self) -> Option<f64> {
        self.tex
    }

    /// Number of data points
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// The raw per-point independent variables, as supplied
    pub fn x(&self) -> &[Vec<f64>] {
        &self.x
    }

    /// The observed values
    pub fn y(&self) -> &[f64] {
        &self.y
    }

    /// Whether per-point uncertainties were supplied
    pub fn is_weighted(&self) -> bool {
        self.err.is_some()
    }

    /// Uncertainty of point `i`, `1.0` when none was supplied
    pub fn uncertainty(&self, i: usize) -> f64 {
        match &self.err {
            Some(err) => err[i],
            None => 1.0,
        }
    }

    /// The first independent variable of every point
    pub fn primary_x(&self) -> Vec<f64> {
        self.x
            .iter()
            .map(|x| x.first().copied().unwrap_or(0.0))
            .collect()
    }

    /// Assemble the full independent-variable vector of point `i`
    ///
    /// The layout depends on the experiment kind:
    ///
    /// | kind  | layout                                   |
    /// |-------|------------------------------------------|
    /// | Cpmg  | `[nu_cpmg, field_x, field_h, tau]`       |
    /// | Exp   | `[delay]`                                |
    /// | Noe   | `[field_h]`                              |
    /// | Cest  | `[offset_ppm, b1_hz, tex, field_x]`      |
    /// | R1rho | `[offset_ppm, b1_hz, tex, field_x]`      |
    ///
    /// For CEST and R1rho a second per-point value overrides the experiment B1 field.
    pub fn independent(&self, i: usize) -> Vec<f64> {
        let point = &self.x[i];
        let first = point.first().copied().unwrap_or(0.0);
        match self.kind {
            ExperimentKind::Cpmg => vec![
                first,
                self.field_x,
                self.field_h,
                self.tex.unwrap_or(0.0),
            ],
            ExperimentKind::Exp => vec![first],
            ExperimentKind::Noe => vec![self.field_h],
            ExperimentKind::Cest | ExperimentKind::R1rho => {
                let b1 = point
                    .get(1)
                    .copied()
                    .or(self.b1_field)
                    .unwrap_or(0.0);
                vec![first, b1, self.tex.unwrap_or(0.0), self.field_x]
            }
        }
    }

    /// All independent-variable vectors, in point order
    pub fn independents(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.independent(i)).collect()
    }
}
