//! An interprocess application-metrics store backed by POSIX System V
//! shared memory, laid out so that an external reader (a PCP PMDA, for
//! instance) can map the same segments and walk the index without talking
//! to this process at all.
//!
//! A store is a pair of SysV shared-memory segments reachable through one
//! rendezvous file: an index segment (a small header plus an append-only
//! table of 16-byte entries) and a data segment (the packed scalar values
//! themselves). Application code only ever sees [`facade::MetricsLogger`];
//! everything below it — the packing codec, the host platform
//! abstraction, the segment pair, the rendezvous lock, the index manager,
//! the registry — exists to make that facade correct under concurrent
//! readers and writers.
//!
//! ```no_run
//! use pcp_shmstore::config::{RawMetricConfig, StoreConfig, StoreMode};
//! use pcp_shmstore::facade::MetricsLogger;
//! use pcp_shmstore::platform::sysv::SysvPlatform;
//! use std::path::Path;
//!
//! let config = StoreConfig {
//!     name: "myapp".into(),
//!     identifier: "0".into(),
//!     metrics: vec![RawMetricConfig {
//!         kind: "counter".into(),
//!         name: "requests".into(),
//!         pcp_cluster: 0,
//!         pcp_item: Some(1),
//!         pcp_instance: None,
//!     }],
//!     version: 1,
//!     mode: StoreMode::ReadWrite,
//!     development_mode: true,
//! };
//!
//! let mut logger = MetricsLogger::open(SysvPlatform::new(), &config, Path::new("/var/tmp"));
//! logger.increment("requests");
//! assert_eq!(logger.get("requests"), Some(1));
//! ```
//!
//! Byte order is host-native throughout; a producer and its PMDA must run
//! on the same-endian host. `increment` is a read-modify-write, not an
//! inter-process atomic — concurrent increments on the same metric from
//! different processes can lose an update, which is an accepted trade-off
//! given the alternative (atomics over SysV shared memory with no
//! portable CAS primitive) per the design notes in `DESIGN.md`.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod consts;
pub mod error;
pub mod facade;
pub mod index;
pub mod lockfile;
pub mod pack;
pub mod platform;
pub mod registry;
pub mod segment;

pub use config::{RawMetricConfig, StoreConfig, StoreMode};
pub use error::{ConfigError, LockKind, StoreError, StoreResult};
pub use facade::MetricsLogger;
pub use registry::{MetricConfig, MetricKind, MetricsRegistry, PhysicalMetric};

/// Install a global `tracing` subscriber reading its filter from
/// `RUST_LOG`, for binaries embedding this store that don't already set
/// up their own subscriber.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
