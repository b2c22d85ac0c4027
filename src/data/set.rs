use std::collections::HashMap;

use crate::data::Experiment;

/// Index of an experimental state: `[residue, field, temperature, b1]`
pub type State = [usize; 4];

/// The state string used for the default (first field, temperature and B1) state
pub const DEFAULT_STATE: &str = "0:0:0";

/// Collection of experiments grouped per residue
///
/// Experiments are assigned a [State] from the distinct fields (floored 1H MHz),
/// temperatures (rounded K) and B1 fields (rounded Hz) in order of first appearance.
/// Experiments without a B1 field always take B1 index 0, explicit B1 values then
/// follow from index 1. Parameters shared across fields or temperatures are tied
/// together through these indices when a [crate::map::ParameterMap] is built.
#[derive(Debug, Clone, Default)]
pub struct ExperimentSet {
    residues: Vec<String>,
    experiments: HashMap<String, Vec<Experiment>>,
    fields: Vec<i64>,
    temperatures: Vec<i64>,
    b1_fields: Vec<i64>,
    without_b1: bool,
}

fn position_or_push<T: PartialEq + Copy>(values: &mut Vec<T>, value: T) -> usize {
    match values.iter().position(|v| *v == value) {
        Some(index) => index,
        None => {
            values.push(value);
            values.len() - 1
        }
    }
}

fn field_key(experiment: &Experiment) -> i64 {
    experiment.field_h().floor() as i64
}

fn temperature_key(experiment: &Experiment) -> i64 {
    experiment.temperature().round() as i64
}

fn b1_key(experiment: &Experiment) -> Option<i64> {
    experiment.b1_field().map(|b1| b1.round() as i64)
}

impl ExperimentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_experiments(experiments: impl IntoIterator<Item = Experiment>) -> Self {
        let mut set = Self::new();
        for experiment in experiments {
            set.add(experiment);
        }
        set
    }

    pub fn add(&mut self, experiment: Experiment) {
        position_or_push(&mut self.fields, field_key(&experiment));
        position_or_push(&mut self.temperatures, temperature_key(&experiment));
        match b1_key(&experiment) {
            Some(b1) => {
                position_or_push(&mut self.b1_fields, b1);
            }
            None => self.without_b1 = true,
        }
        let residue = experiment.residue().to_string();
        if !self.experiments.contains_key(&residue) {
            self.residues.push(residue.clone());
        }
        self.experiments.entry(residue).or_default().push(experiment);
    }

    /// Residues in insertion order
    pub fn residues(&self) -> &[String] {
        &self.residues
    }

    /// Experiments recorded for a residue (empty if unknown)
    pub fn experiments(&self, residue: &str) -> &[Experiment] {
        self.experiments
            .get(residue)
            .map(|e| e.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.residues.is_empty()
    }

    /// `[n_residues, n_fields, n_temperatures, n_b1]`
    pub fn state_count(&self) -> [usize; 4] {
        [
            self.residues.len(),
            self.fields.len(),
            self.temperatures.len(),
            self.b1_fields.len() + usize::from(self.without_b1),
        ]
    }

    /// The [State] of an experiment that belongs to this set
    pub fn state_of(&self, experiment: &Experiment) -> State {
        let residue = self
            .residues
            .iter()
            .position(|r| r == experiment.residue())
            .unwrap_or(0);
        let field = self
            .fields
            .iter()
            .position(|f| *f == field_key(experiment))
            .unwrap_or(0);
        let temperature = self
            .temperatures
            .iter()
            .position(|t| *t == temperature_key(experiment))
            .unwrap_or(0);
        let b1 = match b1_key(experiment) {
            None => 0,
            Some(key) => {
                let index = self.b1_fields.iter().position(|b| *b == key).unwrap_or(0);
                index + usize::from(self.without_b1)
            }
        };
        [residue, field, temperature, b1]
    }

    /// States and experiments for a group of residues, in residue then insertion order
    pub fn states_for<S: AsRef<str>>(&self, residues: &[S]) -> Vec<(State, &Experiment)> {
        residues
            .iter()
            .flat_map(|residue| self.experiments(residue.as_ref()).iter())
            .map(|experiment| (self.state_of(experiment), experiment))
            .collect()
    }
}

/// Format the residue-independent part of a state, e.g. `"0:0:0"`
pub fn state_string(state: &State) -> String {
    format!("{}:{}:{}", state[1], state[2], state[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ExperimentKind;

    fn cpmg(residue: &str, field: f64, temperature: f64) -> Experiment {
        Experiment::builder(ExperimentKind::Cpmg, residue)
            .field(field)
            .temperature(temperature)
            .points(&[50.0, 100.0, 500.0], &[20.0, 18.0, 12.0], None)
            .build()
            .unwrap()
    }

    #[test]
    fn test_state_indices_follow_first_appearance() {
        let set = ExperimentSet::from_experiments(vec![
            cpmg("10", 600.2, 298.0),
            cpmg("10", 800.1, 298.0),
            cpmg("11", 600.7, 303.1),
        ]);

        assert_eq!(set.state_count(), [2, 2, 2, 1]);
        let states: Vec<State> = set
            .states_for(&["10", "11"])
            .into_iter()
            .map(|(state, _)| state)
            .collect();
        assert_eq!(states, vec![[0, 0, 0, 0], [0, 1, 0, 0], [1, 0, 1, 0]]);
        assert_eq!(state_string(&states[0]), DEFAULT_STATE);
        assert_eq!(state_string(&states[2]), "0:1:0");
    }

    #[test]
    fn test_unknown_residue_has_no_experiments() {
        let set = ExperimentSet::from_experiments(vec![cpmg("10", 600.0, 298.0)]);
        assert!(set.experiments("99").is_empty());
        assert!(set.states_for(&["99"]).is_empty());
    }

    #[test]
    fn test_missing_b1_takes_index_zero_in_any_order() {
        let spin_lock = |b1: Option<f64>| {
            let builder = Experiment::builder(ExperimentKind::R1rho, "4").field(800.0);
            let builder = match b1 {
                Some(b1) => builder.b1_field(b1),
                None => builder,
            };
            builder
                .points(&[115.0, 118.0, 121.0], &[4.0, 14.0, 5.0], None)
                .build()
                .unwrap()
        };
        let orders = [
            vec![spin_lock(Some(25.0)), spin_lock(None), spin_lock(Some(50.0))],
            vec![spin_lock(None), spin_lock(Some(25.0)), spin_lock(Some(50.0))],
        ];
        for experiments in orders {
            let set = ExperimentSet::from_experiments(experiments);
            assert_eq!(set.state_count()[3], 3);
            for (state, experiment) in set.states_for(&["4"]) {
                let expected = match experiment.b1_field() {
                    None => 0,
                    Some(b1) if b1 < 30.0 => 1,
                    Some(_) => 2,
                };
                assert_eq!(state[3], expected);
            }
        }

        // explicit values alone still start at the default state
        let set = ExperimentSet::from_experiments(vec![spin_lock(Some(25.0))]);
        assert_eq!(set.state_count()[3], 1);
        assert_eq!(state_string(&set.states_for(&["4"])[0].0), DEFAULT_STATE);
    }
}
