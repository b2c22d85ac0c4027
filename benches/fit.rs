use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use relaxfit::data::{Experiment, ExperimentKind, ExperimentSet};
use relaxfit::equation::{self, cest, cpmg, r1rho};
use relaxfit::fit::{FitOptions, ResidueFitter};
use relaxfit::modelfree::{relax_equations, MfModel, Nucleus};
use std::hint::black_box;
use std::sync::atomic::AtomicBool;

const NU_CPMG: [f64; 11] = [
    25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 400.0, 600.0, 800.0, 1000.0,
];

/// A fast-exchange CPMG profile with a small deterministic ripple
fn cpmg_experiment(residue: &str, field: f64, r2: f64) -> Experiment {
    let field_x = field * 2.7116e7 / 2.6752218744e8;
    let y: Vec<f64> = NU_CPMG
        .iter()
        .enumerate()
        .map(|(i, nu)| {
            let ripple = if i % 2 == 0 { 0.05 } else { -0.05 };
            cpmg::fast(&[800.0, r2, 0.5], &[*nu, field_x, field, 0.0]) + ripple
        })
        .collect();
    Experiment::builder(ExperimentKind::Cpmg, residue)
        .field(field)
        .points(&NU_CPMG, &y, Some(&[0.1; 11][..]))
        .build()
        .unwrap()
}

fn bench_equations(c: &mut Criterion) {
    let mut group = c.benchmark_group("equations");
    let cpmg_x = [200.0, 60.8, 600.0, 0.04];
    let profile_x = [118.5, 800.0, 0.3, 60.8];
    let exchange = [900.0, 0.06, 118.0, 122.0, 1.5, 1.5, 12.0, 30.0];

    group.bench_function("cpmg_slow", |b| {
        b.iter(|| cpmg::slow(black_box(&[600.0, 0.93, 12.0, 1.5]), black_box(&cpmg_x)))
    });
    group.bench_function("cpmg_mq", |b| {
        b.iter(|| {
            cpmg::multiple_quantum(black_box(&[600.0, 0.93, 12.0, 1.5, 0.2]), black_box(&cpmg_x))
        })
    });
    group.bench_function("r1rho_laguerre", |b| {
        b.iter(|| r1rho::laguerre(black_box(&exchange), black_box(&profile_x)))
    });
    group.bench_function("cest_baldwin_kay", |b| {
        b.iter(|| cest::baldwin_kay(black_box(&exchange), black_box(&profile_x)))
    });
    group.finish();
}

fn bench_spectral_density(c: &mut Criterion) {
    let relax = relax_equations(600.0e6, Nucleus::H, Nucleus::N).unwrap();
    let model = MfModel::build("2sf", false, 10.0, 0.25, false).unwrap();
    let pars = [0.9, 0.03, 0.85, 0.8];
    c.bench_function("model_free_2sf_rates", |b| {
        b.iter(|| {
            let j = model
                .spectral_density(black_box(relax.omegas()), black_box(&pars))
                .unwrap();
            black_box((relax.r1(&j), relax.r2(&j, 0.0), relax.noe(&j)))
        })
    });
}

fn bench_single_fit(c: &mut Criterion) {
    let fast = equation::find("CPMGFAST").unwrap();
    let set = ExperimentSet::from_experiments(vec![
        cpmg_experiment("1", 600.0, 10.0),
        cpmg_experiment("1", 800.0, 11.0),
    ]);
    let options = FitOptions::default().without_bootstrap().with_processes(1);
    c.bench_function("fit_cpmg_fast_two_fields", |b| {
        b.iter(|| {
            let fitter = ResidueFitter::new(set.clone(), options.clone());
            fitter
                .fit_all(&[fast.name], &AtomicBool::new(false), &|_| {})
                .unwrap();
            black_box(fitter.into_results())
        })
    });
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.sample_size(10);
    for n_residues in [4, 16] {
        let experiments: Vec<Experiment> = (0..n_residues)
            .flat_map(|i| {
                let residue = i.to_string();
                let r2 = 9.0 + 0.25 * i as f64;
                [
                    cpmg_experiment(&residue, 600.0, r2),
                    cpmg_experiment(&residue, 800.0, r2 + 1.0),
                ]
            })
            .collect();
        let set = ExperimentSet::from_experiments(experiments);
        let options = FitOptions::default()
            .with_samples(20)
            .with_seed(1)
            .with_processes(4);
        group.bench_with_input(
            BenchmarkId::new("noex_and_fast", n_residues),
            &set,
            |b, set| {
                b.iter(|| {
                    let fitter = ResidueFitter::new(set.clone(), options.clone());
                    fitter
                        .fit_all(&["NOEX", "CPMGFAST"], &AtomicBool::new(false), &|_| {})
                        .unwrap();
                    black_box(fitter.into_results())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_equations,
    bench_spectral_density,
    bench_single_fit,
    bench_batch
);
criterion_main!(benches);
