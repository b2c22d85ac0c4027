//! Parallel fitting of many residues
//!
//! A batch is a list of residue groups. Residues within a group share their group-scope
//! parameters (typically the exchange rate) and are fitted together, groups are
//! independent and run on a dedicated rayon pool. Each finished group replaces the
//! stored results of its residues wholesale.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;

use crate::data::{Experiment, ExperimentKind, ExperimentSet, State};
use crate::equation::{self, cpmg, EquationType};
use crate::fit::engine::{fit, FitOutcome};
use crate::fit::progress::ProgressTracker;
use crate::fit::FitOptions;
use crate::map::ParameterMap;
use crate::results::{ProcessingStatus, ResidueResult, ResultStore};
use crate::RelaxError;

/// Summary of one batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Status of every residue that was processed
    pub statuses: BTreeMap<String, ProcessingStatus>,
    /// Number of groups processed, successfully or not
    pub completed: usize,
    /// Residues of groups skipped after cancellation
    pub cancelled: Vec<String>,
}

impl BatchReport {
    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }

    /// Residues whose group failed
    pub fn failures(&self) -> impl Iterator<Item = (&String, &ProcessingStatus)> {
        self.statuses.iter().filter(|(_, status)| !status.ok)
    }
}

enum GroupOutcome {
    Processed(Vec<(String, ProcessingStatus)>),
    Cancelled(Vec<String>),
}

/// Fits equations to the residues of an [ExperimentSet] and keeps the results
pub struct ResidueFitter {
    experiments: ExperimentSet,
    options: FitOptions,
    store: ResultStore,
}

impl ResidueFitter {
    pub fn new(experiments: ExperimentSet, options: FitOptions) -> Self {
        let store = ResultStore::new(options.criterion);
        ResidueFitter {
            experiments,
            options,
            store,
        }
    }

    pub fn experiments(&self) -> &ExperimentSet {
        &self.experiments
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    pub fn results(&self) -> &ResultStore {
        &self.store
    }

    pub fn into_results(self) -> ResultStore {
        self.store
    }

    /// Fit every residue on its own
    pub fn fit_all(
        &self,
        equations: &[&str],
        cancel: &AtomicBool,
        progress: &(dyn Fn(f64) + Sync),
    ) -> Result<BatchReport, RelaxError> {
        let groups: Vec<Vec<String>> = self
            .experiments
            .residues()
            .iter()
            .map(|residue| vec![residue.clone()])
            .collect();
        self.fit_groups(&groups, equations, cancel, progress)
    }

    /// Fit groups of residues in parallel
    ///
    /// Every equation is fitted to the experiments of its kind within each group. With
    /// no equations given, all equations registered for the kinds present in a group are
    /// fitted. Unknown equation names fail the whole batch before any work starts; any
    /// other error only fails the group it occurs in and is recorded in the report.
    ///
    /// `cancel` is checked before each group starts, `progress` receives the fraction of
    /// groups done after each group.
    pub fn fit_groups(
        &self,
        groups: &[Vec<String>],
        equations: &[&str],
        cancel: &AtomicBool,
        progress: &(dyn Fn(f64) + Sync),
    ) -> Result<BatchReport, RelaxError> {
        let equations = equations
            .iter()
            .map(|name| equation::find(name))
            .collect::<Result<Vec<_>, _>>()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.n_processes)
            .build()
            .map_err(|e| RelaxError::ThreadPool(e.to_string()))?;

        tracing::info!(
            groups = groups.len(),
            equations = equations.len(),
            threads = self.options.n_processes,
            "Starting batch fit"
        );
        let tracker = ProgressTracker::new(groups.len(), self.options.progress_bar, progress);

        let outcomes: Vec<GroupOutcome> = pool.install(|| {
            groups
                .par_iter()
                .map(|group| {
                    if cancel.load(Ordering::Relaxed) {
                        return GroupOutcome::Cancelled(group.clone());
                    }
                    let statuses = self.process_group(group, &equations);
                    tracker.inc(1);
                    GroupOutcome::Processed(statuses)
                })
                .collect()
        });
        tracker.finish();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                GroupOutcome::Processed(statuses) => {
                    report.completed += 1;
                    report.statuses.extend(statuses);
                }
                GroupOutcome::Cancelled(residues) => report.cancelled.extend(residues),
            }
        }
        if report.was_cancelled() {
            tracing::warn!(
                skipped = report.cancelled.len(),
                "Batch cancelled before all groups were fitted"
            );
        }
        tracing::info!(
            completed = report.completed,
            failed = report.failures().count(),
            "Batch fit finished"
        );
        Ok(report)
    }

    fn process_group(
        &self,
        group: &[String],
        equations: &[&'static EquationType],
    ) -> Vec<(String, ProcessingStatus)> {
        match self.fit_group(group, equations) {
            Ok(results) => results
                .into_values()
                .map(|result| {
                    let residue = result.residue().to_string();
                    let status = result.status().clone();
                    self.store.replace(result);
                    (residue, status)
                })
                .collect(),
            Err(error) => {
                tracing::warn!(group = group.join(","), %error, "Group fit failed");
                group
                    .iter()
                    .map(|residue| {
                        let status = ProcessingStatus::failed(error.to_string());
                        self.store.set_status(residue, status.clone());
                        (residue.clone(), status)
                    })
                    .collect()
            }
        }
    }

    /// Fit one group, returning a fresh result for each of its residues
    pub fn fit_group(
        &self,
        group: &[String],
        equations: &[&'static EquationType],
    ) -> Result<BTreeMap<String, ResidueResult>, RelaxError> {
        let entries = self.experiments.states_for(group);
        if entries.is_empty() {
            return Err(RelaxError::NoData {
                residue: group.join(","),
            });
        }

        let equations: Vec<&EquationType> = if equations.is_empty() {
            let mut kinds: Vec<ExperimentKind> = Vec::new();
            for (_, experiment) in &entries {
                if !kinds.contains(&experiment.kind()) {
                    kinds.push(experiment.kind());
                }
            }
            kinds
                .into_iter()
                .flat_map(|kind| equation::equations_for(kind).iter())
                .collect()
        } else {
            equations.to_vec()
        };

        let mut results: BTreeMap<String, ResidueResult> = group
            .iter()
            .map(|residue| (residue.clone(), ResidueResult::new(residue.as_str())))
            .collect();

        let mut fitted = 0;
        let mut skipped: Vec<String> = Vec::new();
        for equation in equations {
            let selected: Vec<(State, &Experiment)> = entries
                .iter()
                .filter(|(_, experiment)| experiment.kind() == equation.kind)
                .copied()
                .collect();
            if selected.is_empty() {
                continue;
            }
            let states: Vec<State> = selected.iter().map(|(state, _)| *state).collect();
            let experiments: Vec<&Experiment> = selected.iter().map(|(_, e)| *e).collect();

            let map = ParameterMap::for_states(&states, equation)?;
            let guesses: Vec<Vec<f64>> = experiments
                .iter()
                .map(|experiment| equation.guess(experiment, &self.options))
                .collect();
            let (lowers, uppers): (Vec<Vec<f64>>, Vec<Vec<f64>>) = experiments
                .iter()
                .zip(guesses.iter())
                .map(|(experiment, guess)| equation.bounds(guess, experiment, &self.options))
                .unzip();
            let mut guess = map.expand_guess(&guesses)?;
            let (lower, upper) = map.expand_bounds(&mut guess, &lowers, &uppers)?;

            let outcome = match fit(
                &experiments,
                equation,
                &map,
                &guess,
                &lower,
                &upper,
                &self.options,
            ) {
                Ok(outcome) => outcome,
                Err(
                    error @ (RelaxError::MissingExchangeTime { .. }
                    | RelaxError::NonFiniteFit { .. }),
                ) => {
                    tracing::warn!(
                        group = group.join(","),
                        equation = equation.name,
                        %error,
                        "Skipping equation"
                    );
                    skipped.push(error.to_string());
                    continue;
                }
                Err(error) => return Err(error),
            };
            let exchange_valid = self.exchange_valid(equation, &map, &outcome, &experiments);
            let curves = outcome.curve_fits(equation, &map, &states);
            for (experiment, mut curve) in experiments.iter().zip(curves) {
                curve.exchange_valid = exchange_valid;
                if let Some(result) = results.get_mut(experiment.residue()) {
                    result.record(curve);
                }
            }
            fitted += 1;
        }

        if fitted == 0 {
            if skipped.is_empty() {
                return Err(RelaxError::NoData {
                    residue: group.join(","),
                });
            }
            return Err(RelaxError::Optimizer(skipped.join("; ")));
        }
        for result in results.values_mut() {
            if result.equations().next().is_none() {
                result.set_status(ProcessingStatus::failed("no experiments for the fitted equations"));
            } else if !skipped.is_empty() {
                result.set_status(ProcessingStatus::partial(skipped.join("; ")));
            }
        }
        Ok(results)
    }

    /// Exchange is reported only when it is resolved and large enough
    ///
    /// The rate must be at least its bootstrap error. For CPMG data the dispersion
    /// amplitude of at least one experiment must also exceed `rex_ratio` times the RMS
    /// of the fit.
    fn exchange_valid(
        &self,
        equation: &EquationType,
        map: &ParameterMap,
        outcome: &FitOutcome,
        experiments: &[&Experiment],
    ) -> bool {
        let Some(kex) = equation.exchange else {
            return true;
        };
        let slot = map.index(0, kex);
        let resolved = outcome.params[slot] >= outcome.errors[slot];
        if equation.kind != ExperimentKind::Cpmg {
            return resolved;
        }
        let threshold = self.options.rex_ratio * outcome.scores.rms;
        let large = experiments.iter().enumerate().any(|(state, experiment)| {
            let local = map.local_params(&outcome.params, state);
            cpmg::rex(equation, &local, experiment).abs() > threshold
        });
        resolved && large
    }
}
