//! Fitting of NMR relaxation-dispersion data
//!
//! The crate evaluates the parametric models used for CPMG, R1rho, CEST, exponential
//! decay and NOE experiments, fits them to many residues in parallel with shared
//! parameters tied together by a [map::ParameterMap], estimates uncertainties by
//! bootstrap and selects the best model per residue by AIC. The [modelfree] module
//! covers model-free analysis of R1/R2/NOE data and deuterium spectral density
//! mapping.

pub mod data;
pub mod equation;
pub mod error;
pub mod fit;
pub mod map;
pub mod modelfree;
pub mod results;

pub use error::RelaxError;

pub mod prelude {
    pub mod data {
        pub use crate::data::{
            state_string, Experiment, ExperimentBuilder, ExperimentKind, ExperimentSet, State,
            DEFAULT_STATE,
        };
    }
    pub mod fit {
        pub use crate::fit::{
            fit, minimize, BatchReport, BootstrapMode, Criterion, FitOptions, FitOutcome,
            ResidueFitter, Scores,
        };
    }
    pub mod modelfree {
        pub use crate::modelfree::{
            estimate_tau, estimate_tau_from_set, fit_deuterium, fit_r1r2noe,
            independent_mapping, joint_mapping, relax_equations, DeuteriumValue, MfModel,
            ModelFreeFit, ModelKind, Nucleus, R1R2NoeValue, RelaxEquations, SpectralDensity,
            TauEstimate,
        };
    }

    pub use crate::data::{Experiment, ExperimentKind, ExperimentSet};
    pub use crate::equation::{self, EquationType, Scope};
    pub use crate::fit::{BootstrapMode, Criterion, FitOptions, ResidueFitter};
    pub use crate::map::ParameterMap;
    pub use crate::results::{CurveFit, ResidueResult, ResultStore};
    pub use crate::RelaxError;
}
