//! Mapping between global fit parameters and per-state local parameters
//!
//! A fit over several residues and experimental states optimizes one global parameter
//! vector. Every state sees the equation's local parameter vector through a row of the
//! [ParameterMap]: `local[j] = global[map[state][j]]`. Shared parameters point at the
//! same global slot from every state.

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::data::State;
use crate::equation::EquationType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MapError {
    #[error("A parameter map needs at least one state")]
    NoStates,
    #[error("Shared parameter {index} is out of range for {n_local} local parameters")]
    SharedOutOfRange { index: usize, n_local: usize },
    #[error("Row {row} has {found} entries, expected {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Slot {slot} in row {row} is outside 0..{n_global}")]
    SlotOutOfRange {
        row: usize,
        slot: usize,
        n_global: usize,
    },
    #[error("Global parameter {0} is not used by any state")]
    UnusedSlot(usize),
    #[error("Expected {expected} rows of per-state values, found {found}")]
    ArityMismatch { expected: usize, found: usize },
}

/// Row-per-state table of global slot indices
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMap {
    map: Vec<Vec<usize>>,
    n_global: usize,
    n_local: usize,
}

impl ParameterMap {
    /// Build a map where the locals in `shared` take one value across all states
    ///
    /// Shared locals occupy global slots `0..shared.len()` in local order, then every
    /// state gets fresh slots for its unshared locals.
    pub fn build(
        state_count: usize,
        n_local: usize,
        shared: &BTreeSet<usize>,
    ) -> Result<ParameterMap, MapError> {
        if state_count == 0 {
            return Err(MapError::NoStates);
        }
        if let Some(&index) = shared.iter().find(|&&i| i >= n_local) {
            return Err(MapError::SharedOutOfRange { index, n_local });
        }

        let shared_slots: HashMap<usize, usize> = shared
            .iter()
            .enumerate()
            .map(|(slot, &local)| (local, slot))
            .collect();
        let mut next = shared.len();
        let map = (0..state_count)
            .map(|_| {
                (0..n_local)
                    .map(|local| match shared_slots.get(&local) {
                        Some(&slot) => slot,
                        None => {
                            next += 1;
                            next - 1
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(ParameterMap {
            map,
            n_global: next,
            n_local,
        })
    }

    /// Build a map from the scopes and links of an equation
    ///
    /// Each `(local, state)` pair is keyed by its canonical local (following links) and
    /// the part of the state its scope distinguishes. Equal keys share a slot. Group
    /// parameters are numbered first, then slots follow first appearance.
    pub fn for_states(
        states: &[State],
        equation: &EquationType,
    ) -> Result<ParameterMap, MapError> {
        if states.is_empty() {
            return Err(MapError::NoStates);
        }
        let n_local = equation.n_pars();
        let mut slots: HashMap<(usize, [Option<usize>; 4]), usize> = HashMap::new();

        for local in 0..n_local {
            let canonical = equation.canonical(local);
            if canonical == local && equation.scopes[local].is_group() {
                let next = slots.len();
                slots.insert((local, [None; 4]), next);
            }
        }

        let mut map = Vec::with_capacity(states.len());
        for state in states {
            let mut row = Vec::with_capacity(n_local);
            for local in 0..n_local {
                let canonical = equation.canonical(local);
                let key = (canonical, equation.scopes[canonical].key(state));
                let next = slots.len();
                row.push(*slots.entry(key).or_insert(next));
            }
            map.push(row);
        }

        Ok(ParameterMap {
            map,
            n_global: slots.len(),
            n_local,
        })
    }

    /// Wrap an explicit table, checking it with [ParameterMap::validate]
    pub fn from_rows(rows: Vec<Vec<usize>>, n_global: usize) -> Result<ParameterMap, MapError> {
        let n_local = rows.first().map(|row| row.len()).unwrap_or(0);
        let map = ParameterMap {
            map: rows,
            n_global,
            n_local,
        };
        map.validate()?;
        Ok(map)
    }

    /// Global slot of a local parameter in a state
    #[inline]
    pub fn index(&self, state: usize, local: usize) -> usize {
        self.map[state][local]
    }

    pub fn row(&self, state: usize) -> &[usize] {
        &self.map[state]
    }

    /// The local parameter vector a state sees
    pub fn local_params(&self, global: &[f64], state: usize) -> Vec<f64> {
        self.map[state].iter().map(|&slot| global[slot]).collect()
    }

    pub(crate) fn fill_local(&self, global: &[f64], state: usize, local: &mut [f64]) {
        for (value, &slot) in local.iter_mut().zip(self.map[state].iter()) {
            *value = global[slot];
        }
    }

    pub fn n_global(&self) -> usize {
        self.n_global
    }

    pub fn n_states(&self) -> usize {
        self.map.len()
    }

    pub fn n_local(&self) -> usize {
        self.n_local
    }

    /// Names of the global parameters, numbered when a parameter has several slots
    pub fn global_names(&self, par_names: &[&str]) -> Vec<String> {
        let mut owner = vec![None; self.n_global];
        for row in &self.map {
            for (local, &slot) in row.iter().enumerate() {
                if slot < self.n_global && owner[slot].is_none() {
                    owner[slot] = Some(local);
                }
            }
        }
        let name_of = |local: Option<usize>| {
            local
                .and_then(|l| par_names.get(l))
                .copied()
                .unwrap_or("?")
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for local in &owner {
            *counts.entry(name_of(*local)).or_default() += 1;
        }
        let mut seen: HashMap<&str, usize> = HashMap::new();
        owner
            .iter()
            .map(|local| {
                let name = name_of(*local);
                if counts[&name] == 1 {
                    name.to_string()
                } else {
                    let k = seen.entry(name).or_default();
                    *k += 1;
                    format!("{} {}", name, *k - 1)
                }
            })
            .collect()
    }

    /// Check arity, slot range and that every global slot is used
    pub fn validate(&self) -> Result<(), MapError> {
        if self.map.is_empty() {
            return Err(MapError::NoStates);
        }
        let mut used = vec![false; self.n_global];
        for (row_index, row) in self.map.iter().enumerate() {
            if row.len() != self.n_local {
                return Err(MapError::RowLength {
                    row: row_index,
                    expected: self.n_local,
                    found: row.len(),
                });
            }
            for &slot in row {
                if slot >= self.n_global {
                    return Err(MapError::SlotOutOfRange {
                        row: row_index,
                        slot,
                        n_global: self.n_global,
                    });
                }
                used[slot] = true;
            }
        }
        match used.iter().position(|u| !u) {
            Some(slot) => Err(MapError::UnusedSlot(slot)),
            None => Ok(()),
        }
    }

    fn check_rows(&self, per_state: &[Vec<f64>]) -> Result<(), MapError> {
        if per_state.len() != self.n_states() {
            return Err(MapError::ArityMismatch {
                expected: self.n_states(),
                found: per_state.len(),
            });
        }
        for (row, values) in per_state.iter().enumerate() {
            if values.len() != self.n_local {
                return Err(MapError::RowLength {
                    row,
                    expected: self.n_local,
                    found: values.len(),
                });
            }
        }
        Ok(())
    }

    /// Average per-state guesses into a global guess
    pub fn expand_guess(&self, per_state: &[Vec<f64>]) -> Result<Vec<f64>, MapError> {
        self.check_rows(per_state)?;
        let mut sum = vec![0.0; self.n_global];
        let mut count = vec![0usize; self.n_global];
        for (row, values) in self.map.iter().zip(per_state.iter()) {
            for (&slot, &value) in row.iter().zip(values.iter()) {
                sum[slot] += value;
                count[slot] += 1;
            }
        }
        Ok(sum
            .iter()
            .zip(count.iter())
            .map(|(s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect())
    }

    /// Merge per-state bounds into global bounds and pull the guess inside them
    ///
    /// A slot shared by several states gets the widest range: the minimum of the
    /// lower and the maximum of the upper bounds.
    pub fn expand_bounds(
        &self,
        guess: &mut [f64],
        lower: &[Vec<f64>],
        upper: &[Vec<f64>],
    ) -> Result<(Vec<f64>, Vec<f64>), MapError> {
        self.check_rows(lower)?;
        self.check_rows(upper)?;
        if guess.len() != self.n_global {
            return Err(MapError::ArityMismatch {
                expected: self.n_global,
                found: guess.len(),
            });
        }
        let mut global_lower = vec![f64::INFINITY; self.n_global];
        let mut global_upper = vec![f64::NEG_INFINITY; self.n_global];
        for (state, row) in self.map.iter().enumerate() {
            for (local, &slot) in row.iter().enumerate() {
                global_lower[slot] = global_lower[slot].min(lower[state][local]);
                global_upper[slot] = global_upper[slot].max(upper[state][local]);
            }
        }
        for ((g, lo), hi) in guess
            .iter_mut()
            .zip(global_lower.iter())
            .zip(global_upper.iter())
        {
            if lo <= hi {
                *g = g.clamp(*lo, *hi);
            }
        }
        Ok((global_lower, global_upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation;

    #[test]
    fn test_build_shares_leading_slots() {
        let shared = BTreeSet::from([0]);
        let map = ParameterMap::build(3, 3, &shared).unwrap();
        assert_eq!(map.n_global(), 1 + 2 * 3);
        assert_eq!(map.row(0), &[0, 1, 2]);
        assert_eq!(map.row(1), &[0, 3, 4]);
        assert_eq!(map.row(2), &[0, 5, 6]);
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let shared = BTreeSet::from([3]);
        assert_eq!(
            ParameterMap::build(2, 3, &shared),
            Err(MapError::SharedOutOfRange {
                index: 3,
                n_local: 3
            })
        );
        assert_eq!(
            ParameterMap::build(0, 3, &BTreeSet::new()),
            Err(MapError::NoStates)
        );
    }

    #[test]
    fn test_validate_detects_unused_and_out_of_range() {
        assert_eq!(
            ParameterMap::from_rows(vec![vec![0, 2]], 3),
            Err(MapError::UnusedSlot(1))
        );
        assert!(matches!(
            ParameterMap::from_rows(vec![vec![0, 3]], 3),
            Err(MapError::SlotOutOfRange { slot: 3, .. })
        ));
        assert!(matches!(
            ParameterMap::from_rows(vec![vec![0, 1], vec![0]], 2),
            Err(MapError::RowLength { row: 1, .. })
        ));
    }

    #[test]
    fn test_scopes_share_exchange_across_fields() {
        // two residues at two fields: Kex shared, R2 per field, shift per residue
        let fast = equation::find("CPMGFAST").unwrap();
        let states = [[0, 0, 0, 0], [0, 1, 0, 0], [1, 0, 0, 0], [1, 1, 0, 0]];
        let map = ParameterMap::for_states(&states, fast).unwrap();
        assert!(map.validate().is_ok());
        assert_eq!(map.n_global(), 1 + 4 + 2);
        assert!((0..4).all(|s| map.index(s, 0) == 0));
        assert_eq!(map.index(0, 2), map.index(1, 2));
        assert_ne!(map.index(0, 2), map.index(2, 2));
        assert_ne!(map.index(0, 1), map.index(1, 1));
        assert_eq!(
            map.global_names(fast.par_names),
            vec!["Kex", "R2 0", "dPPMmin 0", "R2 1", "R2 2", "dPPMmin 1", "R2 3"]
        );
    }

    #[test]
    fn test_links_alias_local_parameters() {
        let laguerre = equation::find("R1RHOLAGUERRE").unwrap();
        let map = ParameterMap::for_states(&[[0, 0, 0, 0]], laguerre).unwrap();
        assert_eq!(map.n_global(), 6);
        assert_eq!(map.index(0, 5), map.index(0, 4));
        assert_eq!(map.index(0, 7), map.index(0, 6));
    }

    #[test]
    fn test_expand_guess_and_bounds() {
        let map = ParameterMap::build(2, 2, &BTreeSet::from([0])).unwrap();
        let mut guess = map
            .expand_guess(&[vec![100.0, 10.0], vec![300.0, 12.0]])
            .unwrap();
        assert_eq!(guess, vec![200.0, 10.0, 12.0]);

        let (lower, upper) = map
            .expand_bounds(
                &mut guess,
                &[vec![0.0, 0.0], vec![50.0, 0.0]],
                &[vec![150.0, 40.0], vec![180.0, 48.0]],
            )
            .unwrap();
        assert_eq!(lower, vec![0.0, 0.0, 0.0]);
        assert_eq!(upper, vec![180.0, 40.0, 48.0]);
        assert_eq!(guess[0], 180.0);

        assert!(matches!(
            map.expand_guess(&[vec![1.0, 2.0]]),
            Err(MapError::ArityMismatch { .. })
        ));
    }
}
