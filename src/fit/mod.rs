//! Fitting equations to experiments
//!
//! [fit] minimizes the weighted residuals of one equation over a group of experiments
//! tied together by a [crate::map::ParameterMap], scores the result and estimates
//! parameter uncertainties by bootstrap. [ResidueFitter] runs [fit] for many residues
//! and equations in parallel and collects the results in a
//! [crate::results::ResultStore].

pub mod batch;
pub mod bootstrap;
pub mod engine;
pub mod optimizer;
pub mod options;
pub(crate) mod problem;
pub mod progress;
pub mod scoring;

pub use batch::{BatchReport, ResidueFitter};
pub use bootstrap::BootstrapSummary;
pub use engine::{fit, FitOutcome};
pub use optimizer::{minimize, Minimum};
pub use options::{BootstrapMode, Criterion, FitOptions};
pub use progress::ProgressTracker;
pub use scoring::Scores;
