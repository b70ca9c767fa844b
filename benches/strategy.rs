//! Benchmarks for host ordering operations.
//!
//! Run with: cargo bench --bench strategy

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use dispatchd::profile::{HostProfile, RoutingProfile};
use dispatchd::strategy::{LoadMetrics, RATIO_PARAM};

fn create_hosts(count: usize) -> Vec<HostProfile> {
    (0..count)
        .map(|i| {
            let mut host = HostProfile {
                id: format!("host{i}"),
                weight: ((i % 5) + 1) as f64,
                ..Default::default()
            };
            host.params
                .insert(RATIO_PARAM.to_string(), json!(((i % 3) + 1) as i64));
            host
        })
        .collect()
}

fn bench_hosts_by_weight(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile/hosts_by_weight");

    for count in [2, 5, 10, 50].iter() {
        let profile = RoutingProfile {
            tenant: "cgrates.org".to_string(),
            id: "bench".to_string(),
            strategy: "*weight".to_string(),
            hosts: create_hosts(*count),
            ..Default::default()
        };

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(profile.hosts_by_weight()))
        });
    }

    group.finish();
}

fn bench_load_metrics_get_hosts(c: &mut Criterion) {
    let mut group = c.benchmark_group("load_metrics/get_hosts");

    for count in [2, 5, 10, 50].iter() {
        let hosts = create_hosts(*count);
        let metrics = LoadMetrics::new(&hosts, 1).unwrap();
        for (i, host) in hosts.iter().enumerate() {
            for _ in 0..i {
                metrics.increment_load(&host.id);
            }
        }

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            b.iter(|| black_box(metrics.get_hosts(&hosts)))
        });
    }

    group.finish();
}

fn bench_load_metrics_bracketing(c: &mut Criterion) {
    let hosts = create_hosts(10);
    let metrics = LoadMetrics::new(&hosts, 1).unwrap();

    c.bench_function("load_metrics/increment_decrement", |b| {
        b.iter(|| {
            metrics.increment_load("host0");
            metrics.decrement_load("host0");
        })
    });
}

criterion_group!(
    benches,
    bench_hosts_by_weight,
    bench_load_metrics_get_hosts,
    bench_load_metrics_bracketing
);
criterion_main!(benches);
