use std::sync::atomic::AtomicBool;

use relaxfit::equation::{cpmg, r1rho};
use relaxfit::prelude::*;

const SIGMA: f64 = 0.1;
const NU_CPMG: [f64; 11] = [
    25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 400.0, 600.0, 800.0, 1000.0,
];
// Fixed zero-mean scatter, one pattern per field
const SCATTER: [[f64; 11]; 2] = [
    [0.12, -0.08, 0.05, -0.11, 0.09, -0.04, 0.10, -0.12, 0.03, -0.07, 0.06],
    [-0.06, 0.10, -0.09, 0.04, -0.12, 0.08, -0.03, 0.11, -0.05, 0.09, -0.10],
];

/// CPMG data at 600 and 800 MHz from CPMGFAST parameters `[Kex, R2, dPPMmin]`
fn dispersion(residue: &str, kex: f64, r2: [f64; 2], dppm: f64) -> Vec<Experiment> {
    [600.0, 800.0]
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let field_x = field * 2.7116e7 / 2.6752218744e8;
            let y: Vec<f64> = NU_CPMG
                .iter()
                .zip(SCATTER[i].iter())
                .map(|(nu, e)| cpmg::fast(&[kex, r2[i], dppm], &[*nu, field_x, *field, 0.0]) + e)
                .collect();
            Experiment::builder(ExperimentKind::Cpmg, residue)
                .field(*field)
                .field_x(field_x)
                .points(&NU_CPMG, &y, Some(&[SIGMA; 11][..]))
                .build()
                .unwrap()
        })
        .collect()
}

fn fit_and_select(experiments: Vec<Experiment>, criterion: Criterion) -> ResultStore {
    let options = FitOptions::default()
        .without_bootstrap()
        .with_criterion(criterion)
        .with_processes(2);
    let fitter = ResidueFitter::new(ExperimentSet::from_experiments(experiments), options);
    fitter
        .fit_all(&["NOEX", "CPMGFAST"], &AtomicBool::new(false), &|_| {})
        .unwrap();
    fitter.into_results()
}

#[test]
fn flat_profiles_select_no_exchange() {
    // zero exchange rate: the fast-exchange curve is flat
    let experiments = dispersion("7", 0.0, [12.0, 13.0], 0.0);
    for criterion in [Criterion::Aic, Criterion::Aicc] {
        let store = fit_and_select(experiments.clone(), criterion);
        assert_eq!(store.get_best("7").unwrap(), "NOEX");

        let noex = store.curve_fit("7", "NOEX", "0:0:0").unwrap();
        let fast = store.curve_fit("7", "CPMGFAST", "0:0:0").unwrap();
        assert!(noex.scores.criterion(criterion) < fast.scores.criterion(criterion));
        assert_eq!(noex.scores.k, 2);
        assert_eq!(fast.scores.k, 4);
    }
}

#[test]
fn dispersive_profiles_select_fast_exchange() {
    let experiments = dispersion("7", 800.0, [10.0, 11.0], 0.5);
    let store = fit_and_select(experiments, Criterion::Aic);
    assert_eq!(store.get_best("7").unwrap(), "CPMGFAST");
    assert!(store.par_value("7", "best", "1:0:0", "Kex").unwrap() > 500.0);
}

#[test]
fn manual_choice_overrides_selection() {
    let experiments = dispersion("7", 0.0, [12.0, 13.0], 0.0);
    let store = fit_and_select(experiments, Criterion::Aic);
    store.set_best("7", "CPMGFAST").unwrap();
    assert_eq!(store.get_best("7").unwrap(), "CPMGFAST");
    assert!(store.set_best("7", "CPMGMQ").is_err());
    assert!(store.get_best("8").is_err());
}

#[test]
fn spin_lock_without_exchange_time_skips_the_propagator_model() {
    let field_x = 800.0 * 2.7116e7 / 2.6752218744e8;
    let params = [1500.0, 0.05, 118.0, 121.0, 1.5, 1.5, 11.0, 11.0];
    let offsets: Vec<f64> = (0..23).map(|i| 108.0 + i as f64).collect();
    let y: Vec<f64> = offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            let ripple = if i % 2 == 0 { 0.05 } else { -0.05 };
            r1rho::laguerre(&params, &[*offset, 1000.0, 0.0, field_x]) + ripple
        })
        .collect();
    let experiment = Experiment::builder(ExperimentKind::R1rho, "12")
        .field(800.0)
        .field_x(field_x)
        .b1_field(1000.0)
        .points(&offsets, &y, Some(&vec![0.1; offsets.len()][..]))
        .build()
        .unwrap();

    let options = FitOptions::default().without_bootstrap().with_processes(1);
    let fitter = ResidueFitter::new(ExperimentSet::from_experiments(vec![experiment]), options);
    let report = fitter
        .fit_all(
            &["R1RHOPERTURBATIONNOEX", "R1RHOEXACT0", "R1RHOPERTURBATION"],
            &AtomicBool::new(false),
            &|_| {},
        )
        .unwrap();

    let status = &report.statuses["12"];
    assert!(status.ok);
    assert!(status.message.as_deref().unwrap().contains("R1RHOEXACT0"));

    let store = fitter.results();
    assert!(store.curve_fit("12", "R1RHOEXACT0", "0:0:0").is_err());
    let best = store.get_best("12").unwrap();
    assert_ne!(best, "R1RHOEXACT0");
    let fit = store.curve_fit("12", &best, "0:0:0").unwrap();
    assert!(fit.scores.aic.is_finite());
}
