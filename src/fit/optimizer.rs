//! Bounded Nelder–Mead minimization
//!
//! The simplex runs in an unconstrained internal space. Each bounded parameter is
//! mapped to its external value by `lower + (upper - lower) * (sin(u) + 1) / 2`, so any
//! internal point is feasible. Parameters with `lower == upper` are held fixed and do
//! not enter the simplex.

use argmin::{
    core::{CostFunction, Error, Executor},
    solver::neldermead::NelderMead,
};

use crate::fit::FitOptions;
use crate::RelaxError;

/// Cost returned for parameter vectors where the model is undefined
pub(crate) const PENALTY: f64 = 1.0e100;

/// Best point found by [minimize]
#[derive(Debug, Clone)]
pub struct Minimum {
    pub params: Vec<f64>,
    pub cost: f64,
    /// Total simplex iterations over all restarts
    pub iterations: u64,
    /// `false` if the last run stopped at the iteration cap
    pub converged: bool,
}

/// Sine transform between a box and the unconstrained internal space
#[derive(Debug, Clone)]
pub(crate) struct BoxTransform {
    lower: Vec<f64>,
    upper: Vec<f64>,
    free: Vec<usize>,
}

impl BoxTransform {
    pub fn new(lower: &[f64], upper: &[f64]) -> Self {
        let free = lower
            .iter()
            .zip(upper.iter())
            .enumerate()
            .filter(|(_, (lo, hi))| lo != hi)
            .map(|(i, _)| i)
            .collect();
        BoxTransform {
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            free,
        }
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    fn is_bounded(&self, i: usize) -> bool {
        self.lower[i].is_finite() && self.upper[i].is_finite()
    }

    pub fn to_internal(&self, external: &[f64]) -> Vec<f64> {
        self.free
            .iter()
            .map(|&i| {
                if self.is_bounded(i) {
                    let (lo, hi) = (self.lower[i], self.upper[i]);
                    let scaled = 2.0 * (external[i] - lo) / (hi - lo) - 1.0;
                    scaled.clamp(-1.0, 1.0).asin()
                } else {
                    external[i]
                }
            })
            .collect()
    }

    /// External point for an internal one; fixed parameters take their bound
    pub fn to_external(&self, internal: &[f64]) -> Vec<f64> {
        let mut external = self.lower.clone();
        for (&i, &u) in self.free.iter().zip(internal.iter()) {
            external[i] = if self.is_bounded(i) {
                let (lo, hi) = (self.lower[i], self.upper[i]);
                (lo + (hi - lo) * (u.sin() + 1.0) / 2.0).clamp(lo, hi)
            } else {
                u
            };
        }
        external
    }
}

struct BoundedCost<'a, F> {
    cost: &'a F,
    transform: &'a BoxTransform,
}

impl<F> CostFunction for BoundedCost<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, internal: &Self::Param) -> Result<Self::Output, Error> {
        let value = (self.cost)(&self.transform.to_external(internal));
        // The simplex cannot order NaN
        Ok(if value.is_finite() { value } else { PENALTY })
    }
}

/// Minimize `cost` over the box `[lower, upper]` starting from `guess`
///
/// The simplex is restarted from the best point `options.restarts` times, which helps
/// when the first run collapses early. The reported parameters always lie inside the
/// bounds.
pub fn minimize<F>(
    cost: F,
    guess: &[f64],
    lower: &[f64],
    upper: &[f64],
    options: &FitOptions,
) -> Result<Minimum, RelaxError>
where
    F: Fn(&[f64]) -> f64,
{
    for (index, (lo, hi)) in lower.iter().zip(upper.iter()).enumerate() {
        if !(lo <= hi) {
            return Err(RelaxError::InvalidBounds {
                index,
                lower: *lo,
                upper: *hi,
            });
        }
    }

    let transform = BoxTransform::new(lower, upper);
    let clamped: Vec<f64> = guess
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(g, (lo, hi))| g.clamp(*lo, *hi))
        .collect();

    if transform.n_free() == 0 {
        let value = cost(&clamped);
        return Ok(Minimum {
            params: clamped,
            cost: if value.is_finite() { value } else { PENALTY },
            iterations: 0,
            converged: true,
        });
    }

    let mut start = transform.to_internal(&clamped);
    let mut best_internal = start.clone();
    let mut best_cost = f64::INFINITY;
    let mut iterations = 0;
    let mut converged = false;

    for _ in 0..=options.restarts {
        let problem = BoundedCost {
            cost: &cost,
            transform: &transform,
        };
        let simplex = create_initial_simplex(&start);
        let solver: NelderMead<Vec<f64>, f64> =
            NelderMead::new(simplex).with_sd_tolerance(options.tolerance)?;
        let result = Executor::new(problem, solver)
            .configure(|state| state.max_iters(options.max_iterations))
            .run()?;

        let state = result.state;
        iterations += state.iter;
        converged = state.iter < options.max_iterations;
        if let Some(param) = state.best_param {
            if state.best_cost <= best_cost {
                best_cost = state.best_cost;
                best_internal = param;
            }
        }
        start = best_internal.clone();
    }

    let params = transform.to_external(&best_internal);
    tracing::trace!(cost = best_cost, iterations, converged, "Simplex finished");
    Ok(Minimum {
        params,
        cost: best_cost,
        iterations,
        converged,
    })
}

fn create_initial_simplex(initial_point: &[f64]) -> Vec<Vec<f64>> {
    let num_dimensions = initial_point.len();
    // Internal coordinates are angles, one step covers a good part of the box
    let perturbation_percentage = 0.1;
    let minimum_step = 0.25;

    let mut vertices = Vec::with_capacity(num_dimensions + 1);
    vertices.push(initial_point.to_vec());

    for i in 0..num_dimensions {
        let perturbation = (perturbation_percentage * initial_point[i].abs()).max(minimum_step);
        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }

    vertices
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn options() -> FitOptions {
        FitOptions::default().with_tolerance(1e-12)
    }

    #[test]
    fn test_transform_round_trip_inside_box() {
        let transform = BoxTransform::new(&[0.0, -1.0, 5.0], &[10.0, 1.0, 5.0]);
        assert_eq!(transform.n_free(), 2);
        let internal = transform.to_internal(&[2.5, 0.3, 5.0]);
        let external = transform.to_external(&internal);
        assert_relative_eq!(external[0], 2.5, epsilon = 1e-12);
        assert_relative_eq!(external[1], 0.3, epsilon = 1e-12);
        assert_eq!(external[2], 5.0);
    }

    #[test]
    fn test_minimize_quadratic() {
        let cost = |p: &[f64]| (p[0] - 3.0).powi(2) + 10.0 * (p[1] + 1.0).powi(2);
        let minimum = minimize(cost, &[1.0, 1.0], &[0.0, -5.0], &[10.0, 5.0], &options()).unwrap();
        assert_relative_eq!(minimum.params[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(minimum.params[1], -1.0, epsilon = 1e-4);
        assert!(minimum.converged);
    }

    #[test]
    fn test_minimum_outside_box_lands_on_bound() {
        let cost = |p: &[f64]| (p[0] + 2.0).powi(2);
        let minimum = minimize(cost, &[1.0], &[0.0], &[4.0], &options()).unwrap();
        assert!(minimum.params[0] >= 0.0);
        assert!(minimum.params[0] < 1e-4);
    }

    #[test]
    fn test_nan_cost_is_penalized() {
        let cost = |p: &[f64]| if p[0] > 2.0 { f64::NAN } else { (p[0] - 1.0).powi(2) };
        let minimum = minimize(cost, &[1.5], &[0.0], &[4.0], &options()).unwrap();
        assert_relative_eq!(minimum.params[0], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_iteration_cap_reports_not_converged() {
        let cost = |p: &[f64]| (p[0] - 3.0).powi(2) + (p[1] - 2.0).powi(2);
        let capped = FitOptions::default()
            .with_max_iterations(2)
            .with_restarts(0)
            .with_tolerance(1e-14);
        let minimum = minimize(cost, &[0.5, 0.5], &[0.0, 0.0], &[10.0, 10.0], &capped).unwrap();
        assert!(!minimum.converged);
        assert!(minimum.params.iter().all(|p| (0.0..=10.0).contains(p)));
    }

    #[test]
    fn test_fixed_parameters_and_invalid_bounds() {
        let cost = |p: &[f64]| p[0] + p[1];
        let minimum = minimize(cost, &[1.0, 2.0], &[1.0, 2.0], &[1.0, 2.0], &options()).unwrap();
        assert_eq!(minimum.params, vec![1.0, 2.0]);
        assert_eq!(minimum.iterations, 0);

        assert!(matches!(
            minimize(cost, &[1.0, 2.0], &[1.0, 3.0], &[1.0, 2.0], &options()),
            Err(RelaxError::InvalidBounds { index: 1, .. })
        ));
    }
}
