use std::sync::atomic::AtomicBool;

use relaxfit::equation::cpmg;
use relaxfit::prelude::*;

const SIGMA: f64 = 0.1;
const NU_CPMG: [f64; 11] = [
    25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 400.0, 600.0, 800.0, 1000.0,
];
const SCATTER: [f64; 11] = [0.12, -0.08, 0.05, -0.11, 0.09, -0.04, 0.10, -0.12, 0.03, -0.07, 0.06];

fn experiment(residue: &str, params: [f64; 3]) -> Experiment {
    let field_x = 600.0 * 2.7116e7 / 2.6752218744e8;
    let y: Vec<f64> = NU_CPMG
        .iter()
        .zip(SCATTER.iter())
        .map(|(nu, e)| cpmg::fast(&params, &[*nu, field_x, 600.0, 0.0]) + e)
        .collect();
    Experiment::builder(ExperimentKind::Cpmg, residue)
        .field(600.0)
        .field_x(field_x)
        .points(&NU_CPMG, &y, Some(&[SIGMA; 11][..]))
        .build()
        .unwrap()
}

fn run(options: FitOptions, equation: &str, params: [f64; 3]) -> ResultStore {
    let set = ExperimentSet::from_experiments(vec![experiment("3", params)]);
    let fitter = ResidueFitter::new(set, options);
    fitter
        .fit_all(&[equation], &AtomicBool::new(false), &|_| {})
        .unwrap();
    fitter.into_results()
}

#[test]
fn same_seed_gives_identical_uncertainties() {
    for mode in [BootstrapMode::Parametric, BootstrapMode::NonParametric] {
        let options = FitOptions::default()
            .with_bootstrap(mode)
            .with_samples(40)
            .with_seed(99)
            .with_processes(2);
        let first = run(options.clone(), "CPMGFAST", [800.0, 10.0, 0.5]);
        let second = run(options.with_processes(1), "CPMGFAST", [800.0, 10.0, 0.5]);

        let a = first.curve_fit("3", "CPMGFAST", "0:0:0").unwrap();
        let b = second.curve_fit("3", "CPMGFAST", "0:0:0").unwrap();
        assert_eq!(a.samples, b.samples, "{} bootstrap differs", mode);
        for name in ["Kex", "R2", "dPPMmin"] {
            assert_eq!(a.error(name).unwrap().to_bits(), b.error(name).unwrap().to_bits());
            assert!(a.error(name).unwrap() > 0.0);
        }
    }
}

#[test]
fn parametric_error_of_a_flat_profile_matches_the_mean() {
    // R2 of a flat profile is a weighted mean, its error is sigma / sqrt(n)
    let options = FitOptions::default()
        .with_bootstrap(BootstrapMode::Parametric)
        .with_samples(400)
        .with_seed(5)
        .with_processes(2);
    let store = run(options, "NOEX", [0.0, 12.0, 0.0]);
    let fit = store.curve_fit("3", "NOEX", "0:0:0").unwrap();

    let expected = SIGMA / (NU_CPMG.len() as f64).sqrt();
    let error = fit.error("R2").unwrap();
    assert!(
        (error - expected).abs() < 0.2 * expected,
        "bootstrap error {} expected near {}",
        error,
        expected
    );
    let samples = fit.samples.as_ref().unwrap();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].len(), 400);
    assert!(!fit.reduced_sample);
}

#[test]
fn disabled_bootstrap_reports_zero_errors() {
    let options = FitOptions::default().without_bootstrap().with_processes(1);
    let store = run(options, "CPMGFAST", [800.0, 10.0, 0.5]);
    let fit = store.curve_fit("3", "CPMGFAST", "0:0:0").unwrap();
    assert!(fit.parameters.iter().all(|p| p.error == 0.0));
    assert!(fit.samples.is_none());
}

#[test]
fn more_samples_do_not_widen_the_error() {
    let mean_error = |n_samples: usize| {
        let seeds = [11, 12, 13, 14, 15];
        let total: f64 = seeds
            .iter()
            .map(|seed| {
                let options = FitOptions::default()
                    .with_bootstrap(BootstrapMode::Parametric)
                    .with_samples(n_samples)
                    .with_seed(*seed)
                    .with_processes(2);
                let store = run(options, "NOEX", [0.0, 12.0, 0.0]);
                store.par_error("3", "NOEX", "0:0:0", "R2").unwrap()
            })
            .sum();
        total / seeds.len() as f64
    };
    let few = mean_error(20);
    let many = mean_error(200);
    let expected = SIGMA / (NU_CPMG.len() as f64).sqrt();
    assert!(many <= 1.1 * few, "{} samples widened the error: {} > {}", 200, many, few);
    assert!((many - expected).abs() < 0.15 * expected, "error {} expected near {}", many, expected);
}
