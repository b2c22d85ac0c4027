use thiserror::Error;

use crate::map::MapError;
use crate::modelfree::ModelFreeError;

#[derive(Error, Debug)]
pub enum RelaxError {
    #[error("Error in the parameter map: {0}")]
    MapError(#[from] MapError),
    #[error("Error in the model-free analysis: {0}")]
    ModelFreeError(#[from] ModelFreeError),
    #[error("Unknown equation: {0}")]
    UnknownEquation(String),
    #[error("Equation {equation} expects {expected}, found {found}")]
    EquationStateMismatch {
        equation: String,
        expected: String,
        found: String,
    },
    #[error("Equation {equation} cannot be fit to {kind} data")]
    ExperimentKindMismatch { equation: String, kind: String },
    #[error("No data for residue {residue}")]
    NoData { residue: String },
    #[error("Equation {equation} needs an exchange time, residue {residue} has none")]
    MissingExchangeTime { equation: String, residue: String },
    #[error("Fit of {equation} never reached a finite cost")]
    NonFiniteFit { equation: String },
    #[error("Invalid bounds for parameter {index}: lower {lower} > upper {upper}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },
    #[error("Optimizer failed: {0}")]
    Optimizer(String),
    #[error("Unknown residue: {0}")]
    UnknownResidue(String),
    #[error("No fit of {equation} at state {state} for residue {residue}")]
    UnknownState {
        residue: String,
        equation: String,
        state: String,
    },
    #[error("Equation {equation} has no parameter {name}")]
    UnknownParameter { equation: String, name: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Could not build the worker pool: {0}")]
    ThreadPool(String),
}

// argmin reports its errors through anyhow
impl From<anyhow::Error> for RelaxError {
    fn from(error: anyhow::Error) -> Self {
        RelaxError::Optimizer(error.to_string())
    }
}

impl From<serde_json::Error> for RelaxError {
    fn from(error: serde_json::Error) -> Self {
        RelaxError::Config(error.to_string())
    }
}
