//! Criterion benchmarks for `ra-math`.
//!
//! Focus on the kernels evaluated once per simulated subject.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ra_math::{adaptive_simpson, gamma_survival, QuadratureOptions};

fn bench_recency_integral(c: &mut Criterion) {
    let mut group = c.benchmark_group("recency_integral");

    for (name, alpha, beta) in [
        ("exponential", 1.0, 2.0),
        ("gamma_shape_2", 2.0, 1.0),
        ("slow_decay", 3.0, 0.5),
    ] {
        group.bench_with_input(
            BenchmarkId::new("adaptive_simpson", name),
            &(alpha, beta),
            |b, &(a, bta)| {
                b.iter(|| {
                    let upper = 3.7_f64;
                    black_box(adaptive_simpson(
                        |s| gamma_survival(s, a, bta),
                        0.0,
                        black_box(upper),
                        QuadratureOptions::default(),
                    ))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_recency_integral);
criterion_main!(benches);
