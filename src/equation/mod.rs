//! Parametric relaxation equations
//!
//! Every equation is a pure function `f(params, x) -> y` described by a static
//! [EquationType]: an ordered parameter list, the state dimensions each parameter
//! varies with ([Scope]), optional links between parameters that must share a value,
//! and heuristic guess and bounds functions used to seed a fit.
//!
//! The equations are grouped by experiment class and registered in a name-indexed
//! registry, see [find] and [equations_for]. Equations of one class compete as
//! alternative models for the same data and are compared by AIC, they are never mixed
//! within one fit.
//!
//! Evaluation never panics. Populations are clamped into `[0, 1]` and rates are floored
//! at zero before evaluation; anything that is still undefined evaluates to a non-finite
//! value which the fit engine turns into a large finite penalty.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::data::{Experiment, ExperimentKind, State};
use crate::fit::FitOptions;
use crate::RelaxError;

pub(crate) mod bloch;
pub mod cest;
pub mod cpmg;
pub mod exp;
pub mod noe;
pub(crate) mod peaks;
pub mod r1rho;

pub(crate) const TWO_PI: f64 = 2.0 * std::f64::consts::PI;

/// Evaluate an equation for one parameter vector and one independent-variable vector
pub type EvalFn = fn(&[f64], &[f64]) -> f64;
/// Heuristic initial values for one experiment
pub type GuessFn = fn(&Experiment, &FitOptions) -> Vec<f64>;
/// Lower and upper bounds around a guess for one experiment
pub type BoundsFn = fn(&[f64], &Experiment, &FitOptions) -> (Vec<f64>, Vec<f64>);

/// The experimental state dimensions a parameter varies with
///
/// A parameter with [Scope::GROUP] takes one value for the whole group of residues
/// and states fitted together (e.g. an exchange rate shared by several residues and
/// fields). The other scopes give the parameter a separate value per residue, and
/// optionally per field, temperature or B1 field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub residue: bool,
    pub field: bool,
    pub temperature: bool,
    pub b1: bool,
}

impl Scope {
    pub const GROUP: Scope = Scope {
        residue: false,
        field: false,
        temperature: false,
        b1: false,
    };
    pub const RESIDUE: Scope = Scope {
        residue: true,
        field: false,
        temperature: false,
        b1: false,
    };
    pub const RESIDUE_TEMP: Scope = Scope {
        residue: true,
        field: false,
        temperature: true,
        b1: false,
    };
    pub const RESIDUE_FIELD_B1: Scope = Scope {
        residue: true,
        field: true,
        temperature: false,
        b1: true,
    };

    pub fn is_group(&self) -> bool {
        *self == Scope::GROUP
    }

    /// The part of a state this scope distinguishes
    pub fn key(&self, state: &State) -> [Option<usize>; 4] {
        [
            self.residue.then_some(state[0]),
            self.field.then_some(state[1]),
            self.temperature.then_some(state[2]),
            self.b1.then_some(state[3]),
        ]
    }
}

/// Static descriptor of one parametric model
#[derive(Debug, Clone, Copy)]
pub struct EquationType {
    pub name: &'static str,
    pub kind: ExperimentKind,
    pub par_names: &'static [&'static str],
    pub scopes: &'static [Scope],
    /// `(alias, canonical)` pairs: the alias parameter always takes the canonical value
    pub links: &'static [(usize, usize)],
    /// Index of the exchange-rate parameter, if the model has exchange
    pub exchange: Option<usize>,
    /// Whether the model integrates over the exchange (spin-lock or saturation) time
    pub needs_tex: bool,
    evaluate: EvalFn,
    guess: GuessFn,
    bounds: BoundsFn,
}

impl EquationType {
    #[allow(clippy::too_many_arguments)]
    pub(crate) const fn new(
        name: &'static str,
        kind: ExperimentKind,
        par_names: &'static [&'static str],
        scopes: &'static [Scope],
        links: &'static [(usize, usize)],
        exchange: Option<usize>,
        evaluate: EvalFn,
        guess: GuessFn,
        bounds: BoundsFn,
    ) -> Self {
        EquationType {
            name,
            kind,
            par_names,
            scopes,
            links,
            exchange,
            needs_tex: false,
            evaluate,
            guess,
            bounds,
        }
    }

    pub(crate) const fn with_tex(self) -> Self {
        EquationType {
            needs_tex: true,
            ..self
        }
    }

    /// Evaluate the equation
    ///
    /// # Arguments
    ///
    /// * `params` - The local parameter vector, in [EquationType::par_names] order
    /// * `x` - The independent variables, see [Experiment::independent]
    #[inline]
    pub fn evaluate(&self, params: &[f64], x: &[f64]) -> f64 {
        (self.evaluate)(params, x)
    }

    /// Number of local parameters
    pub fn n_pars(&self) -> usize {
        self.par_names.len()
    }

    pub fn par_index(&self, name: &str) -> Option<usize> {
        self.par_names
            .iter()
            .position(|p| p.eq_ignore_ascii_case(name))
    }

    /// The parameter whose value `local` takes
    pub fn canonical(&self, local: usize) -> usize {
        self.links
            .iter()
            .find(|(alias, _)| *alias == local)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(local)
    }

    pub fn has_exchange(&self) -> bool {
        self.exchange.is_some()
    }

    /// Heuristic initial values for one experiment, within the declared domain
    pub fn guess(&self, experiment: &Experiment, options: &FitOptions) -> Vec<f64> {
        let mut guess = (self.guess)(experiment, options);
        for (alias, canonical) in self.links {
            guess[*alias] = guess[*canonical];
        }
        guess
    }

    /// Bounds for one experiment, derived from its guess
    pub fn bounds(
        &self,
        guess: &[f64],
        experiment: &Experiment,
        options: &FitOptions,
    ) -> (Vec<f64>, Vec<f64>) {
        (self.bounds)(guess, experiment, options)
    }
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, &'static EquationType> = {
        let mut registry = HashMap::new();
        for equation in all_equations() {
            registry.insert(equation.name, equation);
        }
        registry
    };
}

fn all_equations() -> impl Iterator<Item = &'static EquationType> {
    cpmg::EQUATIONS
        .iter()
        .chain(exp::EQUATIONS.iter())
        .chain(noe::EQUATIONS.iter())
        .chain(r1rho::EQUATIONS.iter())
        .chain(cest::EQUATIONS.iter())
}

/// Look up an equation by name (case-insensitive)
pub fn find(name: &str) -> Result<&'static EquationType, RelaxError> {
    REGISTRY
        .get(name.to_ascii_uppercase().as_str())
        .copied()
        .ok_or_else(|| RelaxError::UnknownEquation(name.to_string()))
}

/// The selectable equations for an experiment class, simplest first
pub fn equations_for(kind: ExperimentKind) -> &'static [EquationType] {
    match kind {
        ExperimentKind::Cpmg => &cpmg::EQUATIONS,
        ExperimentKind::Exp => &exp::EQUATIONS,
        ExperimentKind::Noe => &noe::EQUATIONS,
        ExperimentKind::R1rho => &r1rho::EQUATIONS,
        ExperimentKind::Cest => &cest::EQUATIONS,
    }
}

/// The equation fitted when none is requested for an experiment class
pub fn default_equation(kind: ExperimentKind) -> &'static EquationType {
    &equations_for(kind)[0]
}

// Shared helpers for the heuristic guessers.

pub(crate) fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// The x of the point whose y lies closest to the middle of the y range
pub(crate) fn mid_x(x: &[f64], y: &[f64]) -> f64 {
    let (lo, hi) = min_max(y);
    let target = 0.5 * (lo + hi);
    x.iter()
        .zip(y.iter())
        .min_by(|a, b| {
            (a.1 - target)
                .abs()
                .partial_cmp(&(b.1 - target).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(x, _)| *x)
        .unwrap_or(0.0)
}

/// `[0, 4 * guess]` with a small positive floor on the upper bound
pub(crate) fn scaled_bounds(guess: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let lower = vec![0.0; guess.len()];
    let upper = guess.iter().map(|g| (4.0 * g).max(1.0e-3)).collect();
    (lower, upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive() {
        let equation = find("cpmgfast").unwrap();
        assert_eq!(equation.name, "CPMGFAST");
        assert_eq!(equation.n_pars(), 3);
        assert!(matches!(
            find("NOPE"),
            Err(RelaxError::UnknownEquation(_))
        ));
    }

    #[test]
    fn test_registry_names_are_unique() {
        let n = all_equations().count();
        assert_eq!(REGISTRY.len(), n);
    }

    #[test]
    fn test_descriptors_are_consistent() {
        for equation in all_equations() {
            assert_eq!(
                equation.par_names.len(),
                equation.scopes.len(),
                "{}",
                equation.name
            );
            for (alias, canonical) in equation.links {
                assert!(canonical < alias, "{}", equation.name);
            }
            if let Some(kex) = equation.exchange {
                assert!(kex < equation.n_pars());
            }
        }
    }

    #[test]
    fn test_default_equations_have_no_exchange() {
        for kind in [
            ExperimentKind::Cpmg,
            ExperimentKind::Exp,
            ExperimentKind::Noe,
            ExperimentKind::R1rho,
            ExperimentKind::Cest,
        ] {
            let equation = default_equation(kind);
            assert_eq!(equation.kind, kind);
            assert!(!equation.has_exchange());
        }
    }

    #[test]
    fn test_mid_x() {
        let x = [10.0, 100.0, 1000.0];
        let y = [20.0, 15.5, 11.0];
        assert_eq!(mid_x(&x, &y), 100.0);
    }
}
