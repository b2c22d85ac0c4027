use crate::data::{state_string, Experiment, State};
use crate::equation::EquationType;
use crate::fit::bootstrap::{bootstrap, BootstrapSummary};
use crate::fit::optimizer::{minimize, PENALTY};
use crate::fit::problem::FitProblem;
use crate::fit::{BootstrapMode, FitOptions, Scores};
use crate::map::ParameterMap;
use crate::results::{CurveFit, ParValue};
use crate::RelaxError;

/// Result of fitting one equation to a group of experiments
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Best-fit global parameters
    pub params: Vec<f64>,
    /// Bootstrap standard deviations of the global parameters, zero without bootstrap
    pub errors: Vec<f64>,
    pub scores: Scores,
    pub converged: bool,
    pub iterations: u64,
    pub bootstrap: Option<BootstrapSummary>,
}

/// Fit one equation to a set of experiments sharing parameters through a map
///
/// Row `i` of `map` is the state of `experiments[i]`. All structural problems are
/// reported before any optimization work starts.
///
/// # Arguments
///
/// * `experiments` - The data, one experiment per map row
/// * `equation` - The equation to fit, its kind must match every experiment
/// * `map` - Mapping from global to local parameters
/// * `guess`, `lower`, `upper` - Global starting point and bounds
/// * `options` - Optimizer, weighting and bootstrap options
pub fn fit(
    experiments: &[&Experiment],
    equation: &EquationType,
    map: &ParameterMap,
    guess: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Result<FitOutcome, RelaxError> {
    let mismatch = |expected: String, found: String| RelaxError::EquationStateMismatch {
        equation: equation.name.to_string(),
        expected,
        found,
    };
    if map.n_local() != equation.n_pars() {
        return Err(mismatch(
            format!("{} local parameters", equation.n_pars()),
            format!("a map with {} columns", map.n_local()),
        ));
    }
    if map.n_states() != experiments.len() {
        return Err(mismatch(
            format!("{} states", experiments.len()),
            format!("a map with {} rows", map.n_states()),
        ));
    }
    for (what, values) in [("guess", guess), ("lower bounds", lower), ("upper bounds", upper)] {
        if values.len() != map.n_global() {
            return Err(mismatch(
                format!("{} global parameters", map.n_global()),
                format!("{} values in the {}", values.len(), what),
            ));
        }
    }
    if let Some(experiment) = experiments.iter().find(|e| e.kind() != equation.kind) {
        return Err(RelaxError::ExperimentKindMismatch {
            equation: equation.name.to_string(),
            kind: experiment.kind().to_string(),
        });
    }
    if equation.needs_tex {
        if let Some(experiment) = experiments
            .iter()
            .find(|e| !e.tex().is_some_and(|tex| tex > 0.0))
        {
            return Err(RelaxError::MissingExchangeTime {
                equation: equation.name.to_string(),
                residue: experiment.residue().to_string(),
            });
        }
    }
    map.validate()?;

    let problem = FitProblem::new(experiments, equation, map, options.weighted);
    let minimum = minimize(|p: &[f64]| problem.chi_square(p), guess, lower, upper, options)?;
    if minimum.cost.is_nan() || minimum.cost >= PENALTY {
        return Err(RelaxError::NonFiniteFit {
            equation: equation.name.to_string(),
        });
    }
    if !minimum.converged {
        tracing::warn!(
            equation = equation.name,
            iterations = minimum.iterations,
            "Fit stopped at the iteration limit"
        );
    }

    let scores = score(&problem, &minimum.params);
    tracing::debug!(
        equation = equation.name,
        rss = scores.rss,
        aic = scores.aic,
        iterations = minimum.iterations,
        "Fit finished"
    );

    let bootstrap = match options.bootstrap {
        BootstrapMode::None => None,
        _ => Some(bootstrap(&problem, &minimum.params, lower, upper, options)?),
    };
    let errors = bootstrap
        .as_ref()
        .map(|b| b.errors.clone())
        .unwrap_or_else(|| vec![0.0; minimum.params.len()]);

    Ok(FitOutcome {
        params: minimum.params,
        errors,
        scores,
        converged: minimum.converged,
        iterations: minimum.iterations,
        bootstrap,
    })
}

fn score(problem: &FitProblem, params: &[f64]) -> Scores {
    let predictions = problem.predictions(params);
    let sum_sq = problem
        .observed()
        .iter()
        .zip(predictions.iter())
        .map(|(y, f)| (y - f).powi(2))
        .sum();
    Scores::new(
        problem.n_points(),
        params.len(),
        problem.chi_square(params),
        sum_sq,
    )
}

impl FitOutcome {
    /// Predicted values for the points of each experiment
    pub fn predict(
        &self,
        experiments: &[&Experiment],
        equation: &EquationType,
        map: &ParameterMap,
    ) -> Vec<Vec<f64>> {
        experiments
            .iter()
            .enumerate()
            .map(|(state, experiment)| {
                let local = map.local_params(&self.params, state);
                experiment
                    .independents()
                    .iter()
                    .map(|x| equation.evaluate(&local, x))
                    .collect()
            })
            .collect()
    }

    /// Split the outcome into one [CurveFit] per map row
    pub fn curve_fits(
        &self,
        equation: &EquationType,
        map: &ParameterMap,
        states: &[State],
    ) -> Vec<CurveFit> {
        let reduced_sample = self
            .bootstrap
            .as_ref()
            .map(|b| b.reduced_sample)
            .unwrap_or(false);
        states
            .iter()
            .enumerate()
            .map(|(row, state)| {
                let parameters = equation
                    .par_names
                    .iter()
                    .enumerate()
                    .map(|(local, name)| {
                        let slot = map.index(row, local);
                        ParValue {
                            name: name.to_string(),
                            value: self.params[slot],
                            error: self.errors[slot],
                        }
                    })
                    .collect();
                let samples = self.bootstrap.as_ref().map(|b| {
                    map.row(row)
                        .iter()
                        .map(|&slot| b.samples.column(slot).to_vec())
                        .collect()
                });
                CurveFit {
                    equation: equation.name.to_string(),
                    state: state_string(state),
                    parameters,
                    scores: self.scores,
                    converged: self.converged,
                    exchange_valid: true,
                    reduced_sample,
                    samples,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ExperimentKind;
    use crate::equation;
    use approx::assert_relative_eq;

    fn decay() -> Experiment {
        let delays: [f64; 6] = [0.0, 0.05, 0.1, 0.2, 0.4, 0.8];
        let y: Vec<f64> = delays.iter().map(|t| 500.0 * (-2.5 * t).exp()).collect();
        Experiment::builder(ExperimentKind::Exp, "2")
            .points(&delays, &y, None)
            .build()
            .unwrap()
    }

    #[test]
    fn test_fit_recovers_exponential() {
        let experiment = decay();
        let expab = equation::find("EXPAB").unwrap();
        let map = ParameterMap::for_states(&[[0, 0, 0, 0]], expab).unwrap();
        let options = FitOptions::default().without_bootstrap();
        let outcome = fit(
            &[&experiment],
            expab,
            &map,
            &[400.0, 1.0],
            &[0.0, 0.0],
            &[2000.0, 20.0],
            &options,
        )
        .unwrap();
        assert_relative_eq!(outcome.params[0], 500.0, max_relative = 1e-4);
        assert_relative_eq!(outcome.params[1], 2.5, max_relative = 1e-4);
        assert_eq!(outcome.errors, vec![0.0, 0.0]);
        assert!(outcome.bootstrap.is_none());

        let fits = outcome.curve_fits(expab, &map, &[[0, 0, 0, 0]]);
        assert_eq!(fits.len(), 1);
        assert_eq!(fits[0].state, "0:0:0");
        assert_eq!(fits[0].parameters[1].name, "R");
    }

    #[test]
    fn test_fit_rejects_structural_mismatches() {
        let experiment = decay();
        let expab = equation::find("EXPAB").unwrap();
        let noex = equation::find("NOEX").unwrap();
        let map = ParameterMap::for_states(&[[0, 0, 0, 0]], expab).unwrap();
        let options = FitOptions::default().without_bootstrap();

        let wrong_guess = fit(&[&experiment], expab, &map, &[1.0], &[0.0], &[2.0], &options);
        assert!(matches!(
            wrong_guess,
            Err(RelaxError::EquationStateMismatch { .. })
        ));

        let wrong_states = fit(
            &[&experiment, &experiment],
            expab,
            &map,
            &[1.0, 1.0],
            &[0.0, 0.0],
            &[2.0, 2.0],
            &options,
        );
        assert!(matches!(
            wrong_states,
            Err(RelaxError::EquationStateMismatch { .. })
        ));

        let noex_map = ParameterMap::for_states(&[[0, 0, 0, 0]], noex).unwrap();
        let wrong_kind = fit(&[&experiment], noex, &noex_map, &[1.0], &[0.0], &[2.0], &options);
        assert!(matches!(
            wrong_kind,
            Err(RelaxError::ExperimentKindMismatch { .. })
        ));

        let bad_bounds = fit(
            &[&experiment],
            expab,
            &map,
            &[1.0, 1.0],
            &[0.0, 3.0],
            &[2.0, 2.0],
            &options,
        );
        assert!(matches!(bad_bounds, Err(RelaxError::InvalidBounds { .. })));
    }

    #[test]
    fn test_undefined_model_is_reported_not_scored() {
        let undefined = EquationType::new(
            "UNDEFINED",
            ExperimentKind::Exp,
            &["A", "R"],
            &[equation::Scope::RESIDUE, equation::Scope::RESIDUE],
            &[],
            None,
            |_, _| f64::NAN,
            |_, _| vec![1.0, 1.0],
            |_, _, _| (vec![0.0, 0.0], vec![10.0, 10.0]),
        );
        let experiment = decay();
        let map = ParameterMap::for_states(&[[0, 0, 0, 0]], &undefined).unwrap();
        let options = FitOptions::default().without_bootstrap();
        let result = fit(
            &[&experiment],
            &undefined,
            &map,
            &[1.0, 1.0],
            &[0.0, 0.0],
            &[10.0, 10.0],
            &options,
        );
        assert!(matches!(result, Err(RelaxError::NonFiniteFit { .. })));
    }

    #[test]
    fn test_propagator_models_need_exchange_time() {
        let spin_lock = |tex: Option<f64>| {
            let mut builder = Experiment::builder(ExperimentKind::R1rho, "4")
                .field(800.0)
                .b1_field(1000.0);
            if let Some(tex) = tex {
                builder = builder.tex(tex);
            }
            builder
                .points(&[112.0, 118.0, 124.0], &[3.0, 15.0, 4.0], None)
                .build()
                .unwrap()
        };
        let exact0 = equation::find("R1RHOEXACT0").unwrap();
        assert!(exact0.needs_tex);
        assert!(!equation::find("R1RHOEXACT").unwrap().needs_tex);
        let map = ParameterMap::for_states(&[[0, 0, 0, 0]], exact0).unwrap();
        let options = FitOptions::default().without_bootstrap();
        let guess = [500.0, 0.05, 118.0, 121.0, 1.5, 1.5, 12.0, 12.0];
        let lower = [1.0, 0.0, 117.0, 110.0, 0.0, 0.0, 0.1, 0.1];
        let upper = [2000.0, 0.5, 119.0, 125.0, 6.0, 6.0, 250.0, 250.0];

        for tex in [None, Some(0.0)] {
            let experiment = spin_lock(tex);
            let result = fit(&[&experiment], exact0, &map, &guess, &lower, &upper, &options);
            assert!(matches!(
                result,
                Err(RelaxError::MissingExchangeTime { ref residue, .. }) if residue == "4"
            ));
        }
    }
}
