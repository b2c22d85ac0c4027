//! Fitting model-free models to relaxation rates
//!
//! The cost is the chi-square of all rates at all fields. Parameter vectors that put an
//! internal motion slower than overall tumbling are rejected with a penalty, so the
//! simplex never settles there. Heteronuclear R1/R2/NOE triples and methyl deuteron
//! rate sets share the same search through [RelaxValue].

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::models::MfModel;
use super::relax::RelaxEquations;
use super::spectral::SpectralDensity;
use super::ModelFreeError;
use crate::fit::optimizer::PENALTY;
use crate::fit::{minimize, BootstrapMode, FitOptions, Minimum, Scores};
use crate::RelaxError;

/// Fractions of each bound range tried as additional starting points
const START_FRACTIONS: [f64; 2] = [0.25, 0.75];

/// Rates of one residue measured at one field
pub trait RelaxValue: Sync {
    /// Rates predicted by a model, in the order of [RelaxValue::observed]
    fn rates(&self, model: &MfModel, pars: &[f64]) -> Result<Vec<f64>, ModelFreeError>;

    fn observed(&self) -> Vec<f64>;

    fn errors(&self) -> Vec<f64>;
}

fn check_errors(errors: &[f64]) -> Result<(), ModelFreeError> {
    for err in errors {
        if !(err.is_finite() && *err > 0.0) {
            return Err(ModelFreeError::InvalidUncertainty(*err));
        }
    }
    Ok(())
}

/// R1, R2 and NOE of one residue at one field
#[derive(Debug, Clone, PartialEq)]
pub struct R1R2NoeValue {
    pub relax: RelaxEquations,
    pub r1: f64,
    pub r1_err: f64,
    pub r2: f64,
    pub r2_err: f64,
    pub noe: f64,
    pub noe_err: f64,
}

impl R1R2NoeValue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        relax: RelaxEquations,
        r1: f64,
        r1_err: f64,
        r2: f64,
        r2_err: f64,
        noe: f64,
        noe_err: f64,
    ) -> Result<Self, ModelFreeError> {
        check_errors(&[r1_err, r2_err, noe_err])?;
        Ok(R1R2NoeValue {
            relax,
            r1,
            r1_err,
            r2,
            r2_err,
            noe,
            noe_err,
        })
    }

    /// Predicted `[R1, R2, NOE]` for a model and parameter vector
    pub fn predict(&self, model: &MfModel, pars: &[f64]) -> Result<[f64; 3], ModelFreeError> {
        let j = model.spectral_density(self.relax.omegas(), pars)?;
        Ok([
            self.relax.r1(&j),
            self.relax.r2(&j, model.rex(pars)),
            self.relax.noe(&j),
        ])
    }

    /// Reduced spectral density mapping of this triple
    pub fn spectral_density(&self) -> SpectralDensity {
        SpectralDensity::with_errors(
            self.r1,
            self.r1_err,
            self.r2,
            self.r2_err,
            self.noe,
            self.noe_err,
            &self.relax,
        )
    }
}

impl RelaxValue for R1R2NoeValue {
    fn rates(&self, model: &MfModel, pars: &[f64]) -> Result<Vec<f64>, ModelFreeError> {
        Ok(self.predict(model, pars)?.to_vec())
    }

    fn observed(&self) -> Vec<f64> {
        vec![self.r1, self.r2, self.noe]
    }

    fn errors(&self) -> Vec<f64> {
        vec![self.r1_err, self.r2_err, self.noe_err]
    }
}

/// R1, R1rho, RQ and Rap of a methyl deuteron at one field
#[derive(Debug, Clone, PartialEq)]
pub struct DeuteriumValue {
    pub relax: RelaxEquations,
    pub r1: f64,
    pub r1_err: f64,
    pub r1rho: f64,
    pub r1rho_err: f64,
    pub rq: f64,
    pub rq_err: f64,
    pub rap: f64,
    pub rap_err: f64,
}

impl DeuteriumValue {
    /// Build from `[R1, R1rho, RQ, Rap]` and their uncertainties
    pub fn new(
        relax: RelaxEquations,
        rates: [f64; 4],
        errors: [f64; 4],
    ) -> Result<Self, ModelFreeError> {
        check_errors(&errors)?;
        let [r1, r1rho, rq, rap] = rates;
        let [r1_err, r1rho_err, rq_err, rap_err] = errors;
        Ok(DeuteriumValue {
            relax,
            r1,
            r1_err,
            r1rho,
            r1rho_err,
            rq,
            rq_err,
            rap,
            rap_err,
        })
    }

    /// Predicted `[R1, R1rho, RQ, Rap]`; an exchange term adds to R1rho only
    pub fn predict(&self, model: &MfModel, pars: &[f64]) -> Result<[f64; 4], ModelFreeError> {
        let j = model.spectral_density(self.relax.omegas(), pars)?;
        Ok([
            self.relax.r1_d(&j),
            self.relax.r2_d(&j) + model.rex(pars),
            self.relax.rq_d(&j),
            self.relax.rap_d(&j),
        ])
    }
}

impl RelaxValue for DeuteriumValue {
    fn rates(&self, model: &MfModel, pars: &[f64]) -> Result<Vec<f64>, ModelFreeError> {
        Ok(self.predict(model, pars)?.to_vec())
    }

    fn observed(&self) -> Vec<f64> {
        vec![self.r1, self.r1rho, self.rq, self.rap]
    }

    fn errors(&self) -> Vec<f64> {
        vec![self.r1_err, self.r1rho_err, self.rq_err, self.rap_err]
    }
}

/// Best-fit parameters of one model-free model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFreeFit {
    pub model: MfModel,
    pub par_names: Vec<String>,
    pub params: Vec<f64>,
    /// Bootstrap standard deviations, zero without bootstrap
    pub errors: Vec<f64>,
    pub scores: Scores,
    pub converged: bool,
}

impl ModelFreeFit {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.par_names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| self.params[i])
    }
}

struct Cost<'a, V> {
    model: &'a MfModel,
    data: &'a [V],
}

impl<V: RelaxValue> Cost<'_, V> {
    fn chi_square_with(&self, pars: &[f64], observed: &[Vec<f64>]) -> f64 {
        if !self.model.satisfies_constraints(pars) {
            return f64::INFINITY;
        }
        let mut sum = 0.0;
        for (value, obs) in self.data.iter().zip(observed.iter()) {
            let predicted = match value.rates(self.model, pars) {
                Ok(predicted) => predicted,
                Err(_) => return f64::INFINITY,
            };
            for ((p, o), e) in predicted.iter().zip(obs.iter()).zip(value.errors().iter()) {
                sum += ((p - o) / e).powi(2);
            }
        }
        sum
    }

    fn sum_sq(&self, pars: &[f64]) -> f64 {
        self.data
            .iter()
            .filter_map(|value| {
                let predicted = value.rates(self.model, pars).ok()?;
                Some(
                    predicted
                        .iter()
                        .zip(value.observed().iter())
                        .map(|(p, o)| (p - o).powi(2))
                        .sum::<f64>(),
                )
            })
            .sum()
    }

    fn n_rates(&self) -> usize {
        self.data.iter().map(|v| v.observed().len()).sum()
    }
}

/// The model start followed by a coarse grid over the bound ranges
fn starting_points(model: &MfModel) -> Vec<Vec<f64>> {
    let start = model.start();
    let lower = model.lower();
    let upper = model.upper();
    let mut points = vec![start.clone()];
    // Tau_e and Rex keep their start values on the grid
    let first = usize::from(model.fit_tau);
    let last = start.len() - usize::from(model.include_rex);
    let n_grid = last - first;
    for code in 0..START_FRACTIONS.len().pow(n_grid as u32) {
        let mut point = start.clone();
        let mut rest = code;
        for i in first..last {
            let fraction = START_FRACTIONS[rest % START_FRACTIONS.len()];
            rest /= START_FRACTIONS.len();
            point[i] = lower[i] + fraction * (upper[i] - lower[i]);
        }
        if model.satisfies_constraints(&point) {
            points.push(point);
        }
    }
    points
}

fn best_of(
    cost: &(dyn Fn(&[f64]) -> f64 + Sync),
    starts: &[Vec<f64>],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Result<Minimum, RelaxError> {
    let mut best: Option<Minimum> = None;
    for start in starts {
        let minimum = minimize(cost, start, lower, upper, options)?;
        if best.as_ref().map_or(true, |b| minimum.cost < b.cost) {
            best = Some(minimum);
        }
    }
    best.ok_or_else(|| RelaxError::from(ModelFreeError::NoData))
}

/// Fit a model-free model to R1/R2/NOE triples measured at one or more fields
///
/// Every start from a small grid over the bounds is refined and the lowest chi-square
/// wins. With a bootstrap mode set, the rates are resimulated from their uncertainties
/// and refit from the best point to estimate parameter errors.
pub fn fit_r1r2noe(
    model: &MfModel,
    data: &[R1R2NoeValue],
    options: &FitOptions,
) -> Result<ModelFreeFit, RelaxError> {
    fit_rates(model, data, options)
}

/// Fit a model to methyl deuteron rates, usually a `D`-prefixed model with a fitted
/// tumbling time
pub fn fit_deuterium(
    model: &MfModel,
    data: &[DeuteriumValue],
    options: &FitOptions,
) -> Result<ModelFreeFit, RelaxError> {
    fit_rates(model, data, options)
}

fn fit_rates<V: RelaxValue>(
    model: &MfModel,
    data: &[V],
    options: &FitOptions,
) -> Result<ModelFreeFit, RelaxError> {
    if data.is_empty() {
        return Err(ModelFreeError::NoData.into());
    }
    let lower = model.lower();
    let upper = model.upper();
    let cost = Cost { model, data };
    let observed: Vec<Vec<f64>> = data.iter().map(|v| v.observed()).collect();
    let objective = |p: &[f64]| cost.chi_square_with(p, &observed);

    let minimum = best_of(&objective, &starting_points(model), &lower, &upper, options)?;
    let scores = Scores::new(
        cost.n_rates(),
        model.n_pars(),
        minimum.cost,
        cost.sum_sq(&minimum.params),
    );
    tracing::debug!(
        model = %model.name(),
        chi_sq = minimum.cost,
        aic = scores.aic,
        "Model-free fit finished"
    );

    let errors = match options.bootstrap {
        BootstrapMode::None => vec![0.0; minimum.params.len()],
        _ => bootstrap_errors(&cost, &minimum.params, &lower, &upper, options),
    };

    Ok(ModelFreeFit {
        model: model.clone(),
        par_names: model.par_names().iter().map(|n| n.to_string()).collect(),
        params: minimum.params,
        errors,
        scores,
        converged: minimum.converged,
    })
}

/// Standard deviations over refits of rates drawn around the observed values
fn bootstrap_errors<V: RelaxValue>(
    cost: &Cost<'_, V>,
    best: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Vec<f64> {
    let base_seed = options.seed.unwrap_or_else(|| rand::rng().random());
    let refit_options = FitOptions {
        restarts: 0,
        ..options.clone()
    };
    let samples: Vec<Vec<f64>> = (0..options.n_samples)
        .into_par_iter()
        .filter_map(|index| {
            let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
            let simulated: Vec<Vec<f64>> = cost
                .data
                .iter()
                .map(|value| {
                    let mut rates = value.observed();
                    for (rate, err) in rates.iter_mut().zip(value.errors().iter()) {
                        if let Ok(normal) = Normal::new(0.0, *err) {
                            *rate += normal.sample(&mut rng);
                        }
                    }
                    rates
                })
                .collect();
            minimize(
                |p: &[f64]| cost.chi_square_with(p, &simulated),
                best,
                lower,
                upper,
                &refit_options,
            )
            .ok()
            .filter(|m| m.cost < PENALTY)
            .map(|m| m.params)
        })
        .collect();

    if samples.len() < 2 {
        tracing::warn!(
            samples = samples.len(),
            "Too few bootstrap refits for parameter errors"
        );
        return vec![0.0; best.len()];
    }
    let flat: Vec<f64> = samples.iter().flatten().copied().collect();
    match Array2::from_shape_vec((samples.len(), best.len()), flat) {
        Ok(samples) => samples.std_axis(Axis(0), 1.0).to_vec(),
        Err(_) => vec![0.0; best.len()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modelfree::{relax_equations, ModelKind, Nucleus};
    use approx::assert_relative_eq;

    fn synthetic(model: &MfModel, pars: &[f64], fields: &[f64]) -> Vec<R1R2NoeValue> {
        fields
            .iter()
            .map(|sf| {
                let relax = relax_equations(*sf, Nucleus::H, Nucleus::N).unwrap();
                let template =
                    R1R2NoeValue::new(relax.clone(), 1.0, 1.0, 1.0, 1.0, 1.0, 1.0).unwrap();
                let [r1, r2, noe] = template.predict(model, pars).unwrap();
                R1R2NoeValue::new(relax, r1, r1 * 0.03, r2, r2 * 0.03, noe, 0.05).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_fit_model_1f() {
        let model = MfModel::new(ModelKind::M1f, 8.0);
        let data = synthetic(&model, &[0.85, 0.05], &[600.0e6, 800.0e6]);
        let options = FitOptions::default().without_bootstrap();
        let fit = fit_r1r2noe(&model, &data, &options).unwrap();
        assert_relative_eq!(fit.params[0], 0.85, epsilon = 1e-3);
        assert_relative_eq!(fit.params[1], 0.05, epsilon = 2e-3);
        assert!(fit.scores.rss < 1e-6);
        assert_eq!(fit.scores.n, 6);
        assert_eq!(fit.value("sf2"), Some(fit.params[0]));
    }

    #[test]
    fn test_fitted_tau_and_rex() {
        let model = MfModel::new(ModelKind::M1, 10.0).with_fitted_tau(0.25).with_rex();
        let data = synthetic(&model, &[9.0, 0.8, 3.0], &[500.0e6, 600.0e6, 800.0e6]);
        let options = FitOptions::default().without_bootstrap();
        let fit = fit_r1r2noe(&model, &data, &options).unwrap();
        assert_eq!(fit.par_names, vec!["Tau_e", "Sf2", "Rex"]);
        assert_relative_eq!(fit.params[0], 9.0, epsilon = 1e-2);
        assert_relative_eq!(fit.params[1], 0.8, epsilon = 1e-3);
        assert_relative_eq!(fit.params[2], 3.0, epsilon = 1e-2);
    }

    #[test]
    fn test_starting_points_respect_constraints() {
        let model = MfModel::new(ModelKind::M2sf, 2.0);
        let points = starting_points(&model);
        assert_eq!(points[0], model.start());
        assert!(points.len() > 1);
        for point in &points {
            assert!(model.satisfies_constraints(point));
        }
    }

    #[test]
    fn test_bootstrap_errors_are_seeded() {
        let model = MfModel::new(ModelKind::M1, 10.0);
        let data = synthetic(&model, &[0.8], &[600.0e6]);
        let options = FitOptions::default().with_samples(20).with_seed(5);
        let a = fit_r1r2noe(&model, &data, &options).unwrap();
        let b = fit_r1r2noe(&model, &data, &options).unwrap();
        assert_eq!(a.errors, b.errors);
        assert!(a.errors[0] > 0.0);
    }

    #[test]
    fn test_bootstrap_errors_need_two_refits() {
        let model = MfModel::new(ModelKind::M1f, 8.0);
        let best = [0.85, 0.05];
        let data = synthetic(&model, &best, &[600.0e6, 800.0e6]);
        let cost = Cost {
            model: &model,
            data: &data[..],
        };
        let (lower, upper) = (model.lower(), model.upper());
        let single = FitOptions::default().with_samples(1).with_seed(3);
        assert_eq!(bootstrap_errors(&cost, &best, &lower, &upper, &single), vec![0.0; 2]);

        let options = FitOptions::default().with_samples(30).with_seed(3);
        let errors = bootstrap_errors(&cost, &best, &lower, &upper, &options);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));
        assert!(errors[0] < 0.1, "S2 error {}", errors[0]);
    }

    #[test]
    fn test_deuterium_rates_recover_the_axis_order_parameter() {
        let model = MfModel::build("D1f", true, 10.0, 0.5, false).unwrap();
        let truth = [9.0, 0.7, 0.05];
        let data: Vec<DeuteriumValue> = [500.0e6, 800.0e6]
            .iter()
            .map(|sf| {
                let relax = relax_equations(*sf, Nucleus::D, Nucleus::C).unwrap();
                let template = DeuteriumValue::new(relax.clone(), [1.0; 4], [1.0; 4]).unwrap();
                let rates = template.predict(&model, &truth).unwrap();
                DeuteriumValue::new(relax, rates, rates.map(|r| r * 0.02)).unwrap()
            })
            .collect();
        let options = FitOptions::default().without_bootstrap();
        let fit = fit_deuterium(&model, &data, &options).unwrap();
        assert_eq!(fit.scores.n, 8);
        assert_eq!(fit.par_names, vec!["Tau_e", "Sf2", "Tau_f"]);
        assert_relative_eq!(fit.params[0], 9.0, epsilon = 1e-2);
        assert_relative_eq!(fit.params[1], 0.7, epsilon = 1e-3);
        assert!(fit.scores.reduced_chi_sq < 1e-4);
    }

    #[test]
    fn test_deuterium_exchange_adds_to_r1rho_only() {
        let relax = relax_equations(600.0e6, Nucleus::D, Nucleus::C).unwrap();
        let value = DeuteriumValue::new(relax, [1.0; 4], [1.0; 4]).unwrap();
        let plain = MfModel::build("D1f", false, 8.0, 0.25, false).unwrap();
        let with_rex = plain.clone().with_rex();
        let a = value.predict(&plain, &[0.8, 0.04]).unwrap();
        let b = value.predict(&with_rex, &[0.8, 0.04, 2.5]).unwrap();
        assert_relative_eq!(b[1] - a[1], 2.5, epsilon = 1e-9);
        assert_eq!([a[0], a[2], a[3]], [b[0], b[2], b[3]]);
        assert!(matches!(
            DeuteriumValue::new(value.relax.clone(), [1.0; 4], [1.0, 0.0, 1.0, 1.0]),
            Err(ModelFreeError::InvalidUncertainty(_))
        ));
    }

    #[test]
    fn test_empty_data_is_an_error() {
        let model = MfModel::new(ModelKind::M1, 10.0);
        let options = FitOptions::default().without_bootstrap();
        assert!(matches!(
            fit_r1r2noe(&model, &[], &options),
            Err(RelaxError::ModelFreeError(ModelFreeError::NoData))
        ));
    }
}
