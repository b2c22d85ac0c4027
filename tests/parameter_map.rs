use std::collections::{BTreeSet, HashSet};

use relaxfit::equation;
use relaxfit::map::{MapError, ParameterMap};

fn subsets(n: usize) -> impl Iterator<Item = BTreeSet<usize>> {
    (0..1usize << n).map(move |mask| (0..n).filter(|i| mask & (1 << i) != 0).collect())
}

#[test]
fn every_local_parameter_maps_to_one_valid_slot() {
    for state_count in 1..=5 {
        for n_local in 1..=6 {
            for shared in subsets(n_local) {
                let map = ParameterMap::build(state_count, n_local, &shared).unwrap();
                let unshared = n_local - shared.len();
                assert_eq!(map.n_global(), shared.len() + unshared * state_count);
                assert_eq!(map.n_states(), state_count);
                assert!(map.validate().is_ok());

                let mut unshared_slots = HashSet::new();
                for state in 0..state_count {
                    for local in 0..n_local {
                        let slot = map.index(state, local);
                        assert!(slot < map.n_global());
                        if shared.contains(&local) {
                            assert_eq!(slot, map.index(0, local));
                            assert!(slot < shared.len());
                        } else {
                            // each unshared pair owns its slot
                            assert!(unshared_slots.insert(slot));
                        }
                    }
                }
            }
        }
    }
}

#[test]
fn invalid_maps_are_rejected() {
    assert_eq!(
        ParameterMap::build(0, 3, &BTreeSet::new()),
        Err(MapError::NoStates)
    );
    assert_eq!(
        ParameterMap::build(2, 3, &BTreeSet::from([3])),
        Err(MapError::SharedOutOfRange {
            index: 3,
            n_local: 3
        })
    );
    assert!(ParameterMap::from_rows(vec![vec![0, 1], vec![0, 3]], 3).is_err());
    assert!(ParameterMap::from_rows(vec![vec![0, 1], vec![0, 1]], 3).is_err());
}

#[test]
fn scopes_tie_states_together() {
    // two residues at two fields
    let states = [[0, 0, 0, 0], [0, 1, 0, 0], [1, 0, 0, 0], [1, 1, 0, 0]];
    let slow = equation::find("CPMGSLOW").unwrap();
    let map = ParameterMap::for_states(&states, slow).unwrap();

    // Kex and pA are shared by everything
    for row in 0..states.len() {
        assert_eq!(map.index(row, 0), 0);
        assert_eq!(map.index(row, 1), 1);
    }
    // R2 differs per residue and field
    let r2: HashSet<usize> = (0..4).map(|row| map.index(row, 2)).collect();
    assert_eq!(r2.len(), 4);
    // dPPM differs per residue only
    assert_eq!(map.index(0, 3), map.index(1, 3));
    assert_ne!(map.index(0, 3), map.index(2, 3));
    assert_eq!(map.n_global(), 2 + 4 + 2);
    assert!(map.validate().is_ok());
}
