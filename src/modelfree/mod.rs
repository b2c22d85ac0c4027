//! Model-free analysis of heteronuclear relaxation
//!
//! Relaxation rates (R1, R2, NOE, and the deuterium rates) are computed from spectral
//! densities sampled at the frequencies of a [RelaxEquations] object. The spectral
//! densities come either from a Lipari–Szabo style [MfModel] or directly from the rates
//! through spectral density mapping ([SpectralDensity], [deuterium]). The overall
//! tumbling time can be estimated from R2/R1 ([tumbling]) to seed the fits.

use thiserror::Error;

pub mod deuterium;
pub mod fit;
pub mod models;
pub mod relax;
pub mod spectral;
pub mod tumbling;

pub use deuterium::{independent_mapping, joint_mapping, JointMapping};
pub use fit::{
    fit_deuterium, fit_r1r2noe, DeuteriumValue, ModelFreeFit, R1R2NoeValue, RelaxValue,
};
pub use models::{MfModel, ModelKind, METHYL_ORDER_SCALE};
pub use relax::{relax_equations, Nucleus, RelaxEquations};
pub use spectral::{j_lorentz, SpectralDensity};
pub use tumbling::{estimate_tau, estimate_tau_from_set, TauEstimate};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelFreeError {
    #[error("Unknown model-free model: {0}")]
    UnknownModel(String),
    #[error("No dipolar bond length is known for the {0}-{1} pair")]
    UnsupportedPair(String, String),
    #[error("Model {model} takes {expected} parameters, found {found}")]
    ParameterCount {
        model: String,
        expected: usize,
        found: usize,
    },
    #[error("Expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("Rates must come in groups of four (R1, R1rho, RQ, Rap), found {0}")]
    IncompleteRateSet(usize),
    #[error("Rate {0} is not a positive finite number")]
    InvalidRate(f64),
    #[error("Uncertainty {0} is not a positive finite number")]
    InvalidUncertainty(f64),
    #[error("The least-squares design matrix is singular")]
    SingularDesign,
    #[error("No relaxation data to fit")]
    NoData,
}
