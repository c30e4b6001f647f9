//! Minimal producer/consumer demo: one process increments a counter and
//! records timing samples, a second process (simulated here by a second
//! `MetricsLogger` against the same rendezvous file) reads them back.

use pcp_shmstore::config::{RawMetricConfig, StoreConfig, StoreMode};
use pcp_shmstore::facade::MetricsLogger;
use pcp_shmstore::platform::sysv::SysvPlatform;
use std::path::Path;

fn main() {
    pcp_shmstore::init_tracing();

    let config = StoreConfig {
        name: "demo_app".into(),
        identifier: "0".into(),
        metrics: vec![
            RawMetricConfig {
                kind: "counter".into(),
                name: "requests".into(),
                pcp_cluster: 0,
                pcp_item: Some(1),
                pcp_instance: None,
            },
            RawMetricConfig {
                kind: "timer".into(),
                name: "handler_latency".into(),
                pcp_cluster: 0,
                pcp_item: Some(10),
                pcp_instance: None,
            },
        ],
        version: 1,
        mode: StoreMode::ReadWrite,
        development_mode: true,
    };

    let root = Path::new("/var/tmp");
    let mut producer = MetricsLogger::open(SysvPlatform::new(), &config, root);

    for i in 0..5 {
        producer.increment("requests");
        producer.timing("handler_latency", 250 * (i + 1));
    }

    let mut consumer_config = config.clone();
    consumer_config.mode = StoreMode::ReadOnly;
    let mut consumer = MetricsLogger::open(SysvPlatform::new(), &consumer_config, root);

    println!("requests = {:?}", consumer.get("requests"));
    println!("handler_latency.service_time = {:?}", consumer.get("handler_latency.service_time"));
    println!("all metrics = {:#?}", consumer.get_all_metrics());

    producer.delete_shared_memory(true).unwrap();
}
