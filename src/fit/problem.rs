use crate::data::Experiment;
use crate::equation::EquationType;
use crate::map::ParameterMap;

struct Point {
    state: usize,
    x: Vec<f64>,
    y: f64,
    err: f64,
}

/// The data of one fit flattened to points, each tagged with its map row
pub(crate) struct FitProblem<'a> {
    equation: &'a EquationType,
    map: &'a ParameterMap,
    points: Vec<Point>,
    weighted: bool,
}

impl<'a> FitProblem<'a> {
    /// Row `i` of the map belongs to `experiments[i]`
    pub fn new(
        experiments: &[&Experiment],
        equation: &'a EquationType,
        map: &'a ParameterMap,
        weighted: bool,
    ) -> Self {
        let weighted = weighted && experiments.iter().all(|e| e.is_weighted());
        let points = experiments
            .iter()
            .enumerate()
            .flat_map(|(state, experiment)| {
                (0..experiment.len()).map(move |i| Point {
                    state,
                    x: experiment.independent(i),
                    y: experiment.y()[i],
                    err: if weighted {
                        experiment.uncertainty(i)
                    } else {
                        1.0
                    },
                })
            })
            .collect();
        FitProblem {
            equation,
            map,
            points,
            weighted,
        }
    }

    pub fn n_points(&self) -> usize {
        self.points.len()
    }

    /// Whether residuals are scaled by supplied uncertainties
    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    pub fn observed(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.err).collect()
    }

    fn locals(&self, params: &[f64]) -> Vec<Vec<f64>> {
        (0..self.map.n_states())
            .map(|state| {
                let mut local = vec![0.0; self.map.n_local()];
                self.map.fill_local(params, state, &mut local);
                local
            })
            .collect()
    }

    pub fn predictions(&self, params: &[f64]) -> Vec<f64> {
        let locals = self.locals(params);
        self.points
            .iter()
            .map(|p| self.equation.evaluate(&locals[p.state], &p.x))
            .collect()
    }

    /// Weighted sum of squared residuals against the given observations
    pub fn chi_square_with(&self, params: &[f64], observed: &[f64]) -> f64 {
        let locals = self.locals(params);
        self.points
            .iter()
            .zip(observed.iter())
            .map(|(p, y)| {
                let residual = (y - self.equation.evaluate(&locals[p.state], &p.x)) / p.err;
                residual * residual
            })
            .sum()
    }

    pub fn chi_square(&self, params: &[f64]) -> f64 {
        let locals = self.locals(params);
        self.points
            .iter()
            .map(|p| {
                let residual = (p.y - self.equation.evaluate(&locals[p.state], &p.x)) / p.err;
                residual * residual
            })
            .sum()
    }
}
