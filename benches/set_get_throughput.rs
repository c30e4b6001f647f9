//! Throughput benchmark for `set`/`get` on an already-materialized counter.

use criterion::{criterion_group, criterion_main, Criterion};
use pcp_shmstore::config::{RawMetricConfig, StoreConfig, StoreMode};
use pcp_shmstore::facade::MetricsLogger;
use pcp_shmstore::platform::sysv::SysvPlatform;

fn bench_set_get(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        name: "bench".into(),
        identifier: "set_get_throughput".into(),
        metrics: vec![RawMetricConfig {
            kind: "counter".into(),
            name: "hits".into(),
            pcp_cluster: 0,
            pcp_item: Some(1),
            pcp_instance: None,
        }],
        version: 1,
        mode: StoreMode::ReadWrite,
        development_mode: false,
    };
    let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());
    // Materialize the entry once outside the measured loop.
    logger.set("hits", 0.0);

    let mut counter = 0u32;
    c.bench_function("set", |b| {
        b.iter(|| {
            counter = counter.wrapping_add(1);
            logger.set("hits", counter as f64)
        })
    });

    c.bench_function("get", |b| {
        b.iter(|| logger.get("hits"))
    });

    logger.delete_shared_memory(true).unwrap();
}

criterion_group!(benches, bench_set_get);
criterion_main!(benches);
