use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use norta_disc::{CalibrationOptions, CorrelationKind, MarginalTable, NortaInitDisc, Strategy};
use statrs::distribution::NegativeBinomial;

fn negative_binomial_pair() -> NortaInitDisc {
    let options = CalibrationOptions::default();
    let q = options.truncation_quantile;
    let m1 = MarginalTable::from_distribution(&NegativeBinomial::new(15.68, 0.3861).unwrap(), q)
        .unwrap();
    let m2 = MarginalTable::from_distribution(&NegativeBinomial::new(60.21, 0.6211).unwrap(), q)
        .unwrap();
    NortaInitDisc::new(&m1, &m2, CorrelationKind::Rank, options).unwrap()
}

fn bench_functional(c: &mut Criterion) {
    let norta = negative_binomial_pair();
    let mut group = c.benchmark_group("functional_evaluation");
    for strategy in [Strategy::Ni1, Strategy::Ni2a, Strategy::Ni3] {
        let mut f = norta.functional(strategy);
        let mut flip = false;
        group.bench_function(BenchmarkId::from_parameter(strategy), |b| {
            // alternate ρ so the NI2a row cache never hits
            b.iter(|| {
                flip = !flip;
                let rho = if flip { 0.45 } else { 0.46 };
                f.evaluate(black_box(rho)).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_calibration(c: &mut Criterion) {
    let norta = negative_binomial_pair();
    let mut group = c.benchmark_group("calibration");
    group.sample_size(10);
    for strategy in [Strategy::Ni1, Strategy::Ni2a, Strategy::Ni2b, Strategy::Ni3] {
        group.bench_function(BenchmarkId::from_parameter(strategy), |b| {
            b.iter(|| norta.compute_rho(black_box(0.43), strategy).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_functional, bench_calibration);
criterion_main!(benches);
