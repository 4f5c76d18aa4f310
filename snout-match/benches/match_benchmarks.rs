use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use snout_core::DescriptorSet;
use snout_match::RatioMatcher;

/// Deterministic pseudo-random descriptors quantized like SIFT output
fn create_descriptor_set(n: usize, cols: usize, seed: u64) -> DescriptorSet {
    let mut state = seed | 1;
    let rows = (0..n)
        .map(|_| {
            (0..cols)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state % 256) as f32
                })
                .collect()
        })
        .collect();
    DescriptorSet::from_rows(rows).unwrap()
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");

    for &n in &[100usize, 500, 1000] {
        let query = create_descriptor_set(n, 128, 7);
        let train = create_descriptor_set(n, 128, 11);

        let parallel = RatioMatcher::new().parallel(true);
        group.bench_with_input(BenchmarkId::new("parallel", n), &(&query, &train), |b, (q, t)| {
            b.iter(|| black_box(parallel.compare(black_box(q), black_box(t)).unwrap()))
        });

        let sequential = RatioMatcher::new().parallel(false);
        group.bench_with_input(BenchmarkId::new("sequential", n), &(&query, &train), |b, (q, t)| {
            b.iter(|| black_box(sequential.compare(black_box(q), black_box(t)).unwrap()))
        });
    }

    group.finish();
}

fn bench_self_compare(c: &mut Criterion) {
    let set = create_descriptor_set(500, 128, 3);
    let matcher = RatioMatcher::new();
    c.bench_function("self_compare_500", |b| {
        b.iter(|| black_box(matcher.compare(black_box(&set), black_box(&set)).unwrap()))
    });
}

criterion_group!(benches, bench_compare, bench_self_compare);
criterion_main!(benches);
