use std::hint::black_box;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use imu_preint::{Builder, CovarianceCorrection, ImuBias, NavState, PreIntegrator, Vector9};
use nalgebra::Vector3;

fn preintegrator(correction: CovarianceCorrection) -> PreIntegrator {
    let params = Builder::new()
        .accelerometer_noise_density(0.01)
        .gyroscope_noise_density(0.001)
        .covariance_correction(correction)
        .build();
    PreIntegrator::new(params, ImuBias::zero()).unwrap()
}

fn integrate_measurement(c: &mut Criterion) {
    let acc = Vector3::new(0.1, 0.2, -9.81);
    let gyr = Vector3::new(0.01, -0.02, 0.005);
    let dt = 0.01;

    // A fresh window per batch keeps the accumulated rotation small
    c.bench_function("integrate_measurement", |b| {
        b.iter_batched_ref(
            || preintegrator(CovarianceCorrection::None),
            |preint| {
                preint
                    .integrate_measurement(black_box(acc), black_box(gyr), black_box(dt))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

fn update_estimate(c: &mut Criterion) {
    let zeta = Vector9::from_column_slice(&[0.05, -0.03, 0.02, 0.1, 0.2, 0.3, 1.0, -1.0, 0.5]);
    let acc = Vector3::new(0.1, 0.2, -9.81);
    let gyr = Vector3::new(0.01, -0.02, 0.005);

    c.bench_function("update_estimate", |b| {
        b.iter(|| {
            PreIntegrator::update_estimate(black_box(&zeta), black_box(&acc), black_box(&gyr), 0.01)
        })
    });
    c.bench_function("update_estimate_with_jacobians", |b| {
        b.iter(|| {
            PreIntegrator::update_estimate_with_jacobians(
                black_box(&zeta),
                black_box(&acc),
                black_box(&gyr),
                0.01,
            )
        })
    });
}

fn predict(c: &mut Criterion) {
    for (correction, id) in [
        (CovarianceCorrection::None, "noise_model"),
        (CovarianceCorrection::Retract, "noise_model_retract"),
    ] {
        let mut preint = preintegrator(correction);
        for _ in 0..100 {
            preint
                .integrate_measurement(Vector3::new(0.1, 0.2, -9.81), Vector3::new(0.01, -0.02, 0.005), 0.01)
                .unwrap();
        }
        c.bench_function(id, |b| b.iter(|| preint.noise_model().unwrap()));
        if correction == CovarianceCorrection::None {
            let state = NavState::identity();
            c.bench_function("predict_with_jacobians", |b| {
                b.iter(|| preint.predict_with_jacobians(black_box(&state), &ImuBias::zero()))
            });
        }
    }
}

criterion_group!(
    benches,
    integrate_measurement,
    update_estimate,
    predict,
);

criterion_main!(benches);
