//! Property tests over the value-range, timing-bucket, increment, and
//! clear-all invariants. Cross-registry visibility and duplicate-triple
//! dropping are covered by `tests/end_to_end.rs` and `src/registry.rs`'s
//! unit tests respectively.

use pcp_shmstore::config::{RawMetricConfig, StoreConfig, StoreMode};
use pcp_shmstore::facade::MetricsLogger;
use pcp_shmstore::platform::sysv::SysvPlatform;
use proptest::prelude::*;

fn counter_config(identifier: &str, name: &str) -> StoreConfig {
    StoreConfig {
        name: "proptest".into(),
        identifier: identifier.into(),
        metrics: vec![RawMetricConfig {
            kind: "counter".into(),
            name: name.into(),
            pcp_cluster: 0,
            pcp_item: Some(1),
            pcp_instance: None,
        }],
        version: 1,
        mode: StoreMode::ReadWrite,
        development_mode: true,
    }
}

fn timer_config(identifier: &str, name: &str) -> StoreConfig {
    StoreConfig {
        name: "proptest".into(),
        identifier: identifier.into(),
        metrics: vec![RawMetricConfig {
            kind: "timer".into(),
            name: name.into(),
            pcp_cluster: 0,
            pcp_item: None,
            pcp_instance: None,
        }],
        version: 1,
        mode: StoreMode::ReadWrite,
        development_mode: true,
    }
}

proptest! {
    /// Any in-range value round-trips exactly; anything at or past the
    /// u32 boundary resets to 0 instead of wrapping or corrupting the slot.
    #[test]
    fn set_get_round_trips_in_range_values(v in 0u32..u32::MAX) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = counter_config("range_round_trip", "metric");
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());

        prop_assert!(logger.set("metric", v as f64));
        prop_assert_eq!(logger.get("metric"), Some(v));

        logger.delete_shared_memory(true).unwrap();
    }

    /// A sequence of timing samples preserves the bucket-sum and
    /// total-service-time invariants.
    #[test]
    fn timing_preserves_sums(samples in prop::collection::vec(0u32..100_000, 1..30)) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = timer_config("timing_sums", "latency");
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());

        for &ms in &samples {
            prop_assert!(logger.timing("latency", ms));
        }

        let all = logger.get_all_metrics();
        let bucket_sum: u32 = (0..6).map(|k| all[&format!("latency.time_taken_{k}")]).sum();
        prop_assert_eq!(bucket_sum, all["latency.timings_count"]);
        prop_assert_eq!(all["latency.timings_count"], samples.len() as u32);

        let expected_service_time: u64 = samples.iter().map(|&v| v as u64).sum();
        prop_assert_eq!(all["latency.service_time"] as u64, expected_service_time);

        logger.delete_shared_memory(true).unwrap();
    }

    /// N back-to-back increments from a single process yield N.
    #[test]
    fn increment_n_times_yields_n(n in 0u32..200) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = counter_config("increment_n_times", "calls");
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());

        for _ in 0..n {
            prop_assert!(logger.increment("calls"));
        }
        prop_assert_eq!(logger.get("calls"), Some(n));

        logger.delete_shared_memory(true).unwrap();
    }

    /// Clearing always yields all zeros, regardless of prior values.
    #[test]
    fn clear_all_metrics_zeroes_everything(v in 0u32..u32::MAX, ms in 0u32..100_000) {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig {
            name: "proptest".into(),
            identifier: "clear_all".into(),
            metrics: vec![
                RawMetricConfig {
                    kind: "counter".into(),
                    name: "calls".into(),
                    pcp_cluster: 0,
                    pcp_item: Some(1),
                    pcp_instance: None,
                },
                RawMetricConfig {
                    kind: "timer".into(),
                    name: "latency".into(),
                    pcp_cluster: 0,
                    pcp_item: Some(10),
                    pcp_instance: None,
                },
            ],
            version: 1,
            mode: StoreMode::ReadWrite,
            development_mode: true,
        };
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());

        logger.set("calls", v as f64);
        logger.timing("latency", ms);

        prop_assert!(logger.clear_all_metrics());
        let all = logger.get_all_metrics();
        prop_assert!(all.values().all(|&x| x == 0));

        logger.delete_shared_memory(true).unwrap();
    }
}

/// `get_all_metrics` has exactly `1 * counters + 8 * timers` entries.
#[test]
fn get_all_metrics_entry_count_matches_expansion() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        name: "proptest".into(),
        identifier: "entry_count".into(),
        metrics: vec![
            RawMetricConfig {
                kind: "counter".into(),
                name: "a".into(),
                pcp_cluster: 0,
                pcp_item: Some(1),
                pcp_instance: None,
            },
            RawMetricConfig {
                kind: "counter".into(),
                name: "b".into(),
                pcp_cluster: 0,
                pcp_item: Some(2),
                pcp_instance: None,
            },
            RawMetricConfig {
                kind: "timer".into(),
                name: "c".into(),
                pcp_cluster: 0,
                pcp_item: Some(10),
                pcp_instance: None,
            },
        ],
        version: 1,
        mode: StoreMode::ReadWrite,
        development_mode: true,
    };
    let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());
    let all = logger.get_all_metrics();
    assert_eq!(all.len(), 2 * 1 + 1 * 8);
    logger.delete_shared_memory(true).unwrap();
}
