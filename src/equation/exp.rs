//! Exponential decay of peak intensities, `x = [delay (s)]`

use super::{min_max, mid_x, scaled_bounds, EquationType, Scope};
use crate::data::{Experiment, ExperimentKind};
use crate::fit::FitOptions;

const AB_PARS: &[&str] = &["A", "R"];
const AB_SCOPES: &[Scope] = &[Scope::RESIDUE_FIELD_B1, Scope::RESIDUE_FIELD_B1];

const ABC_PARS: &[&str] = &["A", "R", "C"];
const ABC_SCOPES: &[Scope] = &[
    Scope::RESIDUE_FIELD_B1,
    Scope::RESIDUE_FIELD_B1,
    Scope::RESIDUE_FIELD_B1,
];

pub static EQUATIONS: [EquationType; 2] = [
    EquationType::new(
        "EXPAB",
        ExperimentKind::Exp,
        AB_PARS,
        AB_SCOPES,
        &[],
        None,
        expab,
        ab_guess,
        decay_bounds,
    ),
    EquationType::new(
        "EXPABC",
        ExperimentKind::Exp,
        ABC_PARS,
        ABC_SCOPES,
        &[],
        None,
        expabc,
        abc_guess,
        decay_bounds,
    ),
];

pub fn expab(params: &[f64], x: &[f64]) -> f64 {
    params[0] * (-params[1] * x[0]).exp()
}

pub fn expabc(params: &[f64], x: &[f64]) -> f64 {
    params[0] * (-params[1] * x[0]).exp() + params[2]
}

fn ab_guess(experiment: &Experiment, _options: &FitOptions) -> Vec<f64> {
    let y = experiment.y();
    let (_, max_y) = min_max(y);
    let x_mid = mid_x(&experiment.primary_x(), y);
    let rate = if x_mid > 0.0 {
        -(0.5_f64.ln()) / x_mid
    } else {
        1.0
    };
    vec![max_y.max(0.0), rate]
}

fn abc_guess(experiment: &Experiment, options: &FitOptions) -> Vec<f64> {
    let mut guess = ab_guess(experiment, options);
    let (min_y, _) = min_max(experiment.y());
    guess.push(min_y.max(0.0));
    guess
}

fn decay_bounds(
    guess: &[f64],
    _experiment: &Experiment,
    _options: &FitOptions,
) -> (Vec<f64>, Vec<f64>) {
    scaled_bounds(guess)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_expab() {
        assert_relative_eq!(expab(&[100.0, 2.0], &[0.0]), 100.0);
        assert_relative_eq!(
            expab(&[100.0, 2.0], &[0.5]),
            100.0 * (-1.0_f64).exp(),
            max_relative = 1e-12
        );
        assert_relative_eq!(expabc(&[100.0, 2.0, 5.0], &[1.0e3]), 5.0);
    }

    #[test]
    fn test_guess_half_life() {
        let delays = [0.0, 0.1, 0.2, 0.4, 0.8];
        let intensities: Vec<f64> = delays.iter().map(|t| expab(&[1000.0, 3.0], &[*t])).collect();
        let experiment = Experiment::builder(ExperimentKind::Exp, "3")
            .points(&delays, &intensities, None)
            .build()
            .unwrap();
        let guess = EQUATIONS[0].guess(&experiment, &FitOptions::default());
        assert_eq!(guess[0], 1000.0);
        // mid intensity is reached closest to 0.2 s
        assert_relative_eq!(guess[1], 2.0_f64.ln() / 0.2, max_relative = 1e-12);
    }
}
