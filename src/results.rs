//! Per-residue collection of fit results and best-equation selection
//!
//! Every fit of an equation to a residue produces one [CurveFit] per experimental state.
//! A [ResidueResult] keeps these keyed by equation and state, remembering the order in
//! which equations were first recorded. The [ResultStore] holds one [ResidueResult] per
//! residue and is safe to update from the batch fitter's worker threads.

use std::collections::BTreeMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::data::DEFAULT_STATE;
use crate::fit::{Criterion, Scores};
use crate::RelaxError;

/// Alias accepted wherever an equation name is expected, resolved with [ResultStore::get_best]
pub const BEST: &str = "best";

/// A fitted parameter and its bootstrap standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParValue {
    pub name: String,
    pub value: f64,
    pub error: f64,
}

/// The fit of one equation at one state of one residue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFit {
    pub equation: String,
    /// State string, see [crate::data::state_string]
    pub state: String,
    /// Local parameters in the order of the equation's parameter names
    pub parameters: Vec<ParValue>,
    pub scores: Scores,
    /// `false` if the optimizer stopped at its iteration cap
    pub converged: bool,
    /// Whether the fitted exchange is large and well-defined enough to report
    pub exchange_valid: bool,
    /// Too many bootstrap resamples failed, the errors rest on a reduced sample
    pub reduced_sample: bool,
    /// Bootstrap values of every local parameter, when a bootstrap was run
    pub samples: Option<Vec<Vec<f64>>>,
}

impl CurveFit {
    fn parameter(&self, name: &str) -> Option<&ParValue> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.value)
    }

    pub fn error(&self, name: &str) -> Option<f64> {
        self.parameter(name).map(|p| p.error)
    }

    /// Flat `(label, value)` table of the fit
    ///
    /// Each parameter contributes `name` and `name.sd`, followed by `AIC`, `AICc`, `RMS`
    /// and `rChiSq`.
    pub fn par_map(&self) -> Vec<(String, f64)> {
        let mut map: Vec<(String, f64)> = self
            .parameters
            .iter()
            .flat_map(|p| {
                [
                    (p.name.clone(), p.value),
                    (format!("{}.sd", p.name), p.error),
                ]
            })
            .collect();
        map.push(("AIC".to_string(), self.scores.aic));
        map.push(("AICc".to_string(), self.scores.aicc));
        map.push(("RMS".to_string(), self.scores.rms));
        map.push(("rChiSq".to_string(), self.scores.reduced_chi_sq));
        map
    }
}

/// Outcome of processing one residue in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub ok: bool,
    pub message: Option<String>,
}

impl ProcessingStatus {
    pub fn ok() -> Self {
        ProcessingStatus {
            ok: true,
            message: None,
        }
    }

    /// Fitted, but some equations were skipped
    pub fn partial(message: impl Into<String>) -> Self {
        ProcessingStatus {
            ok: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ProcessingStatus {
            ok: false,
            message: Some(message.into()),
        }
    }
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        Self::ok()
    }
}

/// All curve fits of one residue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResidueResult {
    residue: String,
    /// Equation name to state to fit, equations in the order first recorded
    fits: Vec<(String, BTreeMap<String, CurveFit>)>,
    best_override: Option<String>,
    status: ProcessingStatus,
}

impl ResidueResult {
    pub fn new(residue: impl Into<String>) -> Self {
        ResidueResult {
            residue: residue.into(),
            fits: Vec::new(),
            best_override: None,
            status: ProcessingStatus::ok(),
        }
    }

    pub fn residue(&self) -> &str {
        &self.residue
    }

    /// Add or overwrite the fit stored under its equation and state
    pub fn record(&mut self, fit: CurveFit) {
        match self.fits.iter_mut().find(|(name, _)| *name == fit.equation) {
            Some((_, states)) => {
                states.insert(fit.state.clone(), fit);
            }
            None => {
                let equation = fit.equation.clone();
                let states = BTreeMap::from([(fit.state.clone(), fit)]);
                self.fits.push((equation, states));
            }
        }
    }

    /// Fitted equations in the order they were first recorded
    pub fn equations(&self) -> impl Iterator<Item = &str> {
        self.fits.iter().map(|(name, _)| name.as_str())
    }

    pub fn has_equation(&self, equation: &str) -> bool {
        self.fits.iter().any(|(name, _)| name == equation)
    }

    pub fn curve_fit(&self, equation: &str, state: &str) -> Option<&CurveFit> {
        self.fits
            .iter()
            .find(|(name, _)| name == equation)
            .and_then(|(_, states)| states.get(state))
    }

    /// All states fitted for an equation, in state order
    pub fn curve_fits(&self, equation: &str) -> Vec<&CurveFit> {
        self.fits
            .iter()
            .find(|(name, _)| name == equation)
            .map(|(_, states)| states.values().collect())
            .unwrap_or_default()
    }

    /// The best equation: the override if set, else the lowest criterion at the default state
    ///
    /// Ties go to the equation recorded first.
    pub fn best(&self, criterion: Criterion) -> Option<&str> {
        if let Some(equation) = &self.best_override {
            return Some(equation.as_str());
        }
        let mut best: Option<(&str, f64)> = None;
        for (equation, states) in &self.fits {
            let Some(fit) = states.get(DEFAULT_STATE) else {
                continue;
            };
            let value = fit.scores.criterion(criterion);
            // a fit that never produced a finite cost cannot win
            if value.is_nan() || !fit.scores.rss.is_finite() {
                continue;
            }
            match best {
                Some((_, lowest)) if value >= lowest => {}
                _ => best = Some((equation.as_str(), value)),
            }
        }
        best.map(|(equation, _)| equation)
    }

    pub fn best_override(&self) -> Option<&str> {
        self.best_override.as_deref()
    }

    pub fn status(&self) -> &ProcessingStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: ProcessingStatus) {
        self.status = status;
    }
}

/// Thread-safe store of [ResidueResult]s, one per residue
#[derive(Debug, Default)]
pub struct ResultStore {
    results: DashMap<String, ResidueResult>,
    criterion: Criterion,
}

impl ResultStore {
    pub fn new(criterion: Criterion) -> Self {
        ResultStore {
            results: DashMap::new(),
            criterion,
        }
    }

    pub fn criterion(&self) -> Criterion {
        self.criterion
    }

    /// Store one curve fit under the given equation and state
    pub fn record_fit(&self, residue: &str, equation: &str, state: &str, mut fit: CurveFit) {
        fit.equation = equation.to_string();
        fit.state = state.to_string();
        self.results
            .entry(residue.to_string())
            .or_insert_with(|| ResidueResult::new(residue))
            .record(fit);
    }

    /// Replace everything known about a residue, clearing any best-equation override
    pub fn replace(&self, mut result: ResidueResult) {
        result.best_override = None;
        self.results.insert(result.residue.clone(), result);
    }

    /// The best equation for a residue, see [ResidueResult::best]
    pub fn get_best(&self, residue: &str) -> Result<String, RelaxError> {
        let result = self
            .results
            .get(residue)
            .ok_or_else(|| RelaxError::UnknownResidue(residue.to_string()))?;
        result
            .best(self.criterion)
            .map(str::to_string)
            .ok_or_else(|| RelaxError::NoData {
                residue: residue.to_string(),
            })
    }

    /// Override the best equation until the residue is refit
    pub fn set_best(&self, residue: &str, equation: &str) -> Result<(), RelaxError> {
        let mut result = self
            .results
            .get_mut(residue)
            .ok_or_else(|| RelaxError::UnknownResidue(residue.to_string()))?;
        if !result.has_equation(equation) {
            return Err(RelaxError::UnknownEquation(equation.to_string()));
        }
        result.best_override = Some(equation.to_string());
        Ok(())
    }

    fn resolve(&self, residue: &str, equation: &str) -> Result<String, RelaxError> {
        if equation.eq_ignore_ascii_case(BEST) {
            self.get_best(residue)
        } else {
            Ok(equation.to_string())
        }
    }

    /// A copy of one curve fit; `equation` may be [BEST]
    pub fn curve_fit(
        &self,
        residue: &str,
        equation: &str,
        state: &str,
    ) -> Result<CurveFit, RelaxError> {
        let equation = self.resolve(residue, equation)?;
        let result = self
            .results
            .get(residue)
            .ok_or_else(|| RelaxError::UnknownResidue(residue.to_string()))?;
        result
            .curve_fit(&equation, state)
            .cloned()
            .ok_or_else(|| RelaxError::UnknownState {
                residue: residue.to_string(),
                equation,
                state: state.to_string(),
            })
    }

    pub fn par_value(
        &self,
        residue: &str,
        equation: &str,
        state: &str,
        name: &str,
    ) -> Result<f64, RelaxError> {
        let fit = self.curve_fit(residue, equation, state)?;
        fit.value(name).ok_or_else(|| RelaxError::UnknownParameter {
            equation: fit.equation.clone(),
            name: name.to_string(),
        })
    }

    pub fn par_error(
        &self,
        residue: &str,
        equation: &str,
        state: &str,
        name: &str,
    ) -> Result<f64, RelaxError> {
        let fit = self.curve_fit(residue, equation, state)?;
        fit.error(name).ok_or_else(|| RelaxError::UnknownParameter {
            equation: fit.equation.clone(),
            name: name.to_string(),
        })
    }

    /// A copy of everything stored for a residue
    pub fn get(&self, residue: &str) -> Option<ResidueResult> {
        self.results.get(residue).map(|r| r.clone())
    }

    /// Residues with stored results, sorted
    pub fn residues(&self) -> Vec<String> {
        let mut residues: Vec<String> = self.results.iter().map(|r| r.key().clone()).collect();
        residues.sort();
        residues
    }

    pub fn status(&self, residue: &str) -> Option<ProcessingStatus> {
        self.results.get(residue).map(|r| r.status.clone())
    }

    pub fn set_status(&self, residue: &str, status: ProcessingStatus) {
        self.results
            .entry(residue.to_string())
            .or_insert_with(|| ResidueResult::new(residue))
            .set_status(status);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
