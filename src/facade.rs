//! The metrics logger facade: the public API application code calls.
//!
//! Wraps a [`crate::registry::MetricsRegistry`], an
//! [`crate::index::IndexManager`], and a [`crate::segment::SegmentPair`]
//! behind `get`/`set`/`increment`/`timing`, materializing each physical
//! metric's shared-memory slot lazily on first touch and caching the
//! offset locally afterward. All fallible host operations are collapsed to
//! a boolean/sentinel surface here; nothing below this module panics in
//! non-test code, and nothing above it needs to know `StoreError` exists.

use crate::config::{StoreConfig, StoreMode};
use crate::error::StoreError;
use crate::index::IndexManager;
use crate::pack::TypeCode;
use crate::platform::Platform;
use crate::registry::{MetricsRegistry, PhysicalMetric};
use crate::segment::{SegmentKind, SegmentPair};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

struct CachedEntry {
    offset: u32,
}

/// Histogram bucket index for a `timing` call's half-open millisecond ranges.
fn bucket_for_millis(ms: u32) -> u8 {
    match ms {
        0..=999 => 0,
        1_000..=4_999 => 1,
        5_000..=9_999 => 2,
        10_000..=19_999 => 3,
        20_000..=39_999 => 4,
        _ => 5,
    }
}

/// Apply the value-validation rules, logging and coercing to 0 on any
/// violation. `v` is already statically numeric (Rust has no non-numeric
/// `f64`), so only the finiteness, integrality, sign, and wraparound checks
/// apply.
fn validate_value(v: f64, name: &str) -> u32 {
    if !v.is_finite() {
        tracing::warn!(metric = name, value = v, "non-finite value, resetting to 0");
        return 0;
    }
    if v.fract() != 0.0 {
        tracing::warn!(metric = name, value = v, "non-integer value, resetting to 0");
        return 0;
    }
    if v < 0.0 {
        tracing::warn!(metric = name, value = v, "negative value, resetting to 0");
        return 0;
    }
    if v >= u32::MAX as f64 {
        tracing::info!(metric = name, value = v, "wrapping value for '{name}', resetting to 0");
        return 0;
    }
    v as u32
}

/// The public metrics API: one instance per application-level metrics
/// store. Not `Clone`; share via `&mut` or wrap in a `Mutex` if multiple
/// threads need access (increments are not made atomic across them either
/// way — see [`MetricsLogger::increment`]).
pub struct MetricsLogger<P: Platform> {
    platform: P,
    segments: Option<SegmentPair<P>>,
    rendezvous_path: PathBuf,
    index: IndexManager,
    registry: MetricsRegistry,
    writable: bool,
    has_error: bool,
    cache: HashMap<String, CachedEntry>,
}

impl<P: Platform> MetricsLogger<P> {
    /// Construct a logger for `config`, rooted at `rendezvous_root`.
    ///
    /// Never fails outright: a segment-open or header-initialization
    /// failure latches `has_error` and leaves the instance permanently
    /// degraded (all reads return `None`, all writes are no-ops), matching
    /// the `has_error` contract below.
    pub fn open(platform: P, config: &StoreConfig, rendezvous_root: &Path) -> Self {
        let metric_configs = config.metric_configs();
        let registry = MetricsRegistry::build(&metric_configs, config.development_mode);
        let mut writable = matches!(config.mode, StoreMode::ReadWrite);
        let rendezvous_path = rendezvous_root.join(format!("{}.{}", config.name, config.identifier));
        let n_physical = registry.len().max(1);

        let mut index = IndexManager::new();
        let mut has_error = false;

        let segments = if let Err(error) = config.validate() {
            tracing::error!(%error, "invalid store configuration, store is degraded");
            has_error = true;
            None
        } else {
            match SegmentPair::open_or_create(&platform, &rendezvous_path, n_physical, writable) {
                Ok(segments) => {
                    match index.initialize(&platform, &segments, &rendezvous_path, config.version, writable) {
                        Ok(demote_to_read_only) => {
                            if demote_to_read_only {
                                writable = false;
                            }
                            Some(segments)
                        }
                        Err(error) => {
                            tracing::error!(%error, "failed to initialize index header, store is degraded");
                            has_error = true;
                            None
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "failed to open shared-memory segments, store is degraded");
                    has_error = true;
                    None
                }
            }
        };

        Self {
            platform,
            segments,
            rendezvous_path,
            index,
            registry,
            writable,
            has_error,
            cache: HashMap::new(),
        }
    }

    /// Whether initialization ever failed. Never reset once set.
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    fn degraded(&self) -> bool {
        self.has_error || self.segments.is_none()
    }

    /// Resolve `phys`'s data-segment offset, consulting the local cache,
    /// then the index under a shared lock, then appending under an
    /// exclusive lock if it has never been touched before.
    fn materialize(&mut self, phys: &PhysicalMetric) -> Result<u32, StoreError> {
        if let Some(cached) = self.cache.get(&phys.name) {
            return Ok(cached.offset);
        }

        let segments = self.segments.as_ref().expect("checked by caller via degraded()");

        if let Some(entry) = self
            .index
            .find(&self.platform, segments, &self.rendezvous_path, phys.cluster, phys.item, phys.instance)?
        {
            self.cache.insert(phys.name.clone(), CachedEntry { offset: entry.offset });
            return Ok(entry.offset);
        }

        if !self.writable {
            return Err(StoreError::SegmentUnavailable {
                reason: format!("'{}' has no entry yet and store is read-only", phys.name),
            });
        }

        let offset = self.index.append(
            &self.platform,
            segments,
            &self.rendezvous_path,
            phys.cluster,
            phys.item,
            phys.instance,
            phys.type_code,
        )?;
        self.cache.insert(phys.name.clone(), CachedEntry { offset });
        Ok(offset)
    }

    /// Read `name`'s current value. `None` for an unregistered name; `0` for
    /// a registered name whose entry failed to materialize.
    pub fn get(&mut self, name: &str) -> Option<u32> {
        if self.degraded() {
            return None;
        }
        let phys = self.registry.find(name)?.clone();
        match self.materialize(&phys) {
            Ok(offset) => {
                let segments = self.segments.as_ref().expect("checked by degraded()");
                match segments.read(&self.platform, SegmentKind::Data, offset as usize, phys.type_code.len()) {
                    Ok(bytes) => Some(decode_u32(&bytes)),
                    Err(error) => {
                        tracing::error!(metric = name, %error, "failed to read metric value");
                        Some(0)
                    }
                }
            }
            Err(error) => {
                tracing::error!(metric = name, %error, "failed to materialize metric entry");
                Some(0)
            }
        }
    }

    /// Write `v` to `name`. No-op (and logged) for an unregistered name, a
    /// read-only store, or a materialization/write failure.
    pub fn set(&mut self, name: &str, v: f64) -> bool {
        if self.degraded() {
            return false;
        }
        if !self.writable {
            tracing::error!(metric = name, "attempted write on a read-only store");
            return false;
        }
        let Some(phys) = self.registry.find(name).cloned() else {
            return false;
        };

        let value = validate_value(v, name);

        match self.materialize(&phys) {
            Ok(offset) => {
                let segments = self.segments.as_ref().expect("checked by degraded()");
                match segments.write(&self.platform, SegmentKind::Data, offset as usize, &value.to_ne_bytes()) {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::error!(metric = name, %error, "failed to write metric value");
                        false
                    }
                }
            }
            Err(error) => {
                tracing::error!(metric = name, %error, "failed to materialize metric entry");
                false
            }
        }
    }

    /// `set(name, get(name) + delta)`. Not atomic across processes — a
    /// concurrent writer's update can be lost between the read and the
    /// write half.
    pub fn increment_by(&mut self, name: &str, delta: i64) -> bool {
        let current = self.get(name).unwrap_or(0) as i64;
        self.set(name, (current + delta) as f64)
    }

    /// `increment_by(name, 1)`.
    pub fn increment(&mut self, name: &str) -> bool {
        self.increment_by(name, 1)
    }

    /// Record one timing sample of `ms` milliseconds against the timer
    /// named `name`: adds `ms` to `{name}.service_time`, increments exactly
    /// one `{name}.time_taken_k` bucket, and increments `{name}.timings_count`.
    pub fn timing(&mut self, name: &str, ms: u32) -> bool {
        if self.degraded() || !self.writable {
            if !self.degraded() {
                tracing::error!(metric = name, "attempted timing write on a read-only store");
            }
            return false;
        }
        let bucket = bucket_for_millis(ms);
        let service_time_ok = self.increment_by(&format!("{name}.service_time"), ms as i64);
        let bucket_ok = self.increment_by(&format!("{name}.time_taken_{bucket}"), 1);
        let count_ok = self.increment_by(&format!("{name}.timings_count"), 1);
        service_time_ok && bucket_ok && count_ok
    }

    /// Every expanded physical metric name mapped to its current value.
    pub fn get_all_metrics(&mut self) -> HashMap<String, u32> {
        if self.degraded() {
            return HashMap::new();
        }
        let names: Vec<String> = self
            .registry
            .physical_metrics()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        names
            .into_iter()
            .map(|name| {
                let value = self.get(&name).unwrap_or(0);
                (name, value)
            })
            .collect()
    }

    /// Set every physical metric to 0.
    pub fn clear_all_metrics(&mut self) -> bool {
        if self.degraded() {
            return false;
        }
        let names: Vec<String> = self
            .registry
            .physical_metrics()
            .iter()
            .map(|m| m.name.clone())
            .collect();
        let mut all_ok = true;
        for name in names {
            if !self.set(&name, 0.0) {
                all_ok = false;
            }
        }
        all_ok
    }

    /// Delete both segments, optionally unlinking the rendezvous file too.
    /// Idempotent; safe to call on an already-degraded instance.
    pub fn delete_shared_memory(&mut self, drop_key_file: bool) -> Result<(), StoreError> {
        if let Some(segments) = self.segments.take() {
            segments.delete(&self.platform)?;
            if drop_key_file {
                self.platform.remove_rendezvous_file(&self.rendezvous_path)?;
            }
        }
        self.cache.clear();
        Ok(())
    }
}

fn decode_u32(bytes: &[u8]) -> u32 {
    match bytes.len() {
        1 => bytes[0] as u32,
        2 => u16::from_ne_bytes(bytes.try_into().unwrap()) as u32,
        4 => u32::from_ne_bytes(bytes.try_into().unwrap()),
        other => {
            tracing::error!(len = other, "unexpected value width, treating as 0");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawMetricConfig;
    use crate::platform::sysv::SysvPlatform;

    fn config(identifier: &str, dev_mode: bool) -> StoreConfig {
        StoreConfig {
            name: "facadetest".into(),
            identifier: identifier.into(),
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
                    name: "db_query".into(),
                    pcp_cluster: 0,
                    pcp_item: Some(10),
                    pcp_instance: None,
                },
            ],
            version: 1,
            mode: StoreMode::ReadWrite,
            development_mode: dev_mode,
        }
    }

    #[test]
    fn counter_set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("counter_set_then_get_round_trips", true), dir.path());
        assert!(!logger.has_error());

        assert!(logger.set("requests", 41.0));
        assert_eq!(logger.get("requests"), Some(41));

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn increment_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("increment_accumulates", true), dir.path());

        for _ in 0..5 {
            assert!(logger.increment("requests"));
        }
        assert_eq!(logger.get("requests"), Some(5));

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn timing_updates_bucket_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("timing_updates_bucket_and_count", true), dir.path());

        assert!(logger.timing("db_query", 1500));
        assert!(logger.timing("db_query", 250));

        let all = logger.get_all_metrics();
        assert_eq!(all["db_query.service_time"], 1750);
        assert_eq!(all["db_query.time_taken_0"], 1);
        assert_eq!(all["db_query.time_taken_1"], 1);
        assert_eq!(all["db_query.timings_count"], 2);

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn unregistered_name_is_silently_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("unregistered_name_is_silently_ignored", true), dir.path());

        assert_eq!(logger.get("nonexistent"), None);
        assert!(!logger.set("nonexistent", 1.0));

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn out_of_range_value_is_reset_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("out_of_range_value_is_reset_to_zero", true), dir.path());

        assert!(logger.set("requests", -5.0));
        assert_eq!(logger.get("requests"), Some(0));

        assert!(logger.set("requests", 3.5));
        assert_eq!(logger.get("requests"), Some(0));

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn clear_all_metrics_zeroes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &config("clear_all_metrics_zeroes_everything", true), dir.path());

        logger.set("requests", 99.0);
        logger.timing("db_query", 2000);

        assert!(logger.clear_all_metrics());
        let all = logger.get_all_metrics();
        assert!(all.values().all(|&v| v == 0));

        logger.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn read_only_store_never_materializes_new_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetricsLogger::open(
            SysvPlatform::new(),
            &config("read_only_store_never_materializes_new_entries", true),
            dir.path(),
        );

        let mut reader_config = config("read_only_store_never_materializes_new_entries", true);
        reader_config.mode = StoreMode::ReadOnly;
        let mut reader = MetricsLogger::open(SysvPlatform::new(), &reader_config, dir.path());

        assert_eq!(reader.get("requests"), Some(0));
        assert!(!reader.set("requests", 1.0));

        writer.delete_shared_memory(true).unwrap();
    }

    #[test]
    fn zero_version_is_rejected_and_latches_has_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("zero_version_is_rejected_and_latches_has_error", true);
        cfg.version = 0;
        let mut logger = MetricsLogger::open(SysvPlatform::new(), &cfg, dir.path());

        assert!(logger.has_error());
        assert_eq!(logger.get("requests"), None);
        assert!(!logger.set("requests", 1.0));
    }

    #[test]
    fn newer_stored_version_demotes_later_opener_to_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut newer_cfg = config("newer_stored_version_demotes_later_opener_to_read_only", true);
        newer_cfg.version = 5;
        let mut first = MetricsLogger::open(SysvPlatform::new(), &newer_cfg, dir.path());
        assert!(first.set("requests", 1.0));

        let mut older_cfg = newer_cfg.clone();
        older_cfg.version = 3;
        let mut second = MetricsLogger::open(SysvPlatform::new(), &older_cfg, dir.path());

        assert!(!second.has_error());
        assert_eq!(second.get("requests"), Some(1));
        assert!(!second.set("requests", 2.0), "opener with an older version must be read-only");
        assert_eq!(second.get("requests"), Some(1));

        first.delete_shared_memory(true).unwrap();
    }
}
