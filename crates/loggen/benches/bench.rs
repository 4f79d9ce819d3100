use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use loggen::generators::{LogGenerator, MetricGenerator, TraceGenerator};
use rand::{SeedableRng, rngs::StdRng};
use std::collections::BTreeMap;

const RATES: &[usize] = &[100, 1_000, 10_000];
const NOW_NANOS: u128 = 1_700_000_000_000_000_000;

fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("env".to_string(), "bench".to_string()),
        ("region".to_string(), "eu-west-1".to_string()),
    ])
}

fn bench_logs(c: &mut Criterion) {
    let mut group = c.benchmark_group("logs");
    for &rate in RATES {
        let generator = LogGenerator::new(rate, labels());
        let mut rng = StdRng::seed_from_u64(42);
        group.throughput(Throughput::Elements(rate as u64));
        group.bench_function(format!("elems/{rate}"), |b| {
            b.iter(|| black_box(generator.build_with(&mut rng, NOW_NANOS)));
        });
    }
    group.finish();
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("metrics");
    for &rate in RATES {
        let generator = MetricGenerator::new(rate, labels());
        let mut rng = StdRng::seed_from_u64(42);
        group.throughput(Throughput::Elements(rate as u64));
        group.bench_function(format!("elems/{rate}"), |b| {
            b.iter(|| black_box(generator.build_with(&mut rng, NOW_NANOS)));
        });
    }
    group.finish();
}

fn bench_traces(c: &mut Criterion) {
    let mut group = c.benchmark_group("traces");
    for &rate in RATES {
        let generator = TraceGenerator::new(rate, labels());
        let mut rng = StdRng::seed_from_u64(42);
        group.throughput(Throughput::Elements(rate as u64));
        group.bench_function(format!("elems/{rate}"), |b| {
            b.iter(|| black_box(generator.build_with(&mut rng, NOW_NANOS)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_logs, bench_metrics, bench_traces);
criterion_main!(benches);
