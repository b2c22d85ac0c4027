//! Heteronuclear NOE, a single constant per residue and field

use super::{mean, EquationType, Scope};
use crate::data::{Experiment, ExperimentKind};
use crate::fit::FitOptions;

const NOE_PARS: &[&str] = &["NOE"];
const NOE_SCOPES: &[Scope] = &[Scope::RESIDUE_FIELD_B1];

pub static EQUATIONS: [EquationType; 1] = [EquationType::new(
    "NOE",
    ExperimentKind::Noe,
    NOE_PARS,
    NOE_SCOPES,
    &[],
    None,
    noe,
    noe_guess,
    noe_bounds,
)];

pub fn noe(params: &[f64], _x: &[f64]) -> f64 {
    params[0]
}

fn noe_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    vec![mean(experiment.y())]
}

// NOE values may be negative
fn noe_bounds(
    guess: &[f64],
    _experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    let width = (4.0 * guess[0].abs()).max(1.0);
    (vec![-width], vec![width])
}
