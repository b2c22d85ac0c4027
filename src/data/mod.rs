pub mod builder;
pub mod experiment;
pub mod set;
pub use builder::ExperimentBuilder;
pub use experiment::{Experiment, ExperimentKind};
pub use set::{state_string, ExperimentSet, State, DEFAULT_STATE};
