//! Criterion benchmarks for growxcor-signal: full cross-correlation and similarity.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use growxcor_signal::{Window, cross_correlate, similarity};

fn make_sine_window(n: usize, phase: f64) -> Window {
    let values: Vec<f64> = (0..n).map(|i| (i as f64 * 0.3 + phase).sin()).collect();
    Window::new(values).unwrap()
}

fn bench_cross_correlate(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_correlate");
    for &len in &[41usize, 73, 256] {
        let a = make_sine_window(len, 0.0);
        let b = make_sine_window(len, 0.5);
        group.bench_with_input(BenchmarkId::from_parameter(len), &(a, b), |bencher, (a, b)| {
            bencher.iter(|| cross_correlate(a.as_slice(), b.as_slice()));
        });
    }
    group.finish();
}

fn bench_similarity(c: &mut Criterion) {
    let a = make_sine_window(73, 0.0);
    let b = make_sine_window(73, 1.0);
    c.bench_function("similarity_73", |bencher| {
        bencher.iter(|| similarity(&a, &b).unwrap());
    });
}

criterion_group!(benches, bench_cross_correlate, bench_similarity);
criterion_main!(benches);
