//! Metrics registry and validator.
//!
//! Expands a user-supplied list of logical metric configs into the flat
//! set of physical metrics actually stored in shared memory: a counter is
//! one physical slot, a timer is eight (`service_time`, six bucket counts,
//! `timings_count`) at consecutive item ids. In development mode, configs
//! are validated and duplicates dropped in the exact order below; outside
//! development mode configs are trusted as-is for performance.

use crate::consts::INSTANCE_DOMAIN_NULL;
use crate::pack::TypeCode;
use md5::{Digest, Md5};
use std::collections::HashSet;

/// The two logical metric kinds the registry understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A single monotonically-intended u32 slot.
    Counter,
    /// An 8-slot timing histogram expanded by [`MetricsRegistry`].
    Timer,
}

/// A user-supplied logical metric declaration, as it arrives from
/// programmatic construction or a deserialized [`crate::config::StoreConfig`].
#[derive(Debug, Clone)]
pub struct MetricConfig {
    /// `counter` or `timer`.
    pub kind: MetricKind,
    /// Logical metric name; physical names are derived from it.
    pub name: String,
    /// PCP cluster id.
    pub cluster: u16,
    /// PCP item id. Required for counters; defaults to 0 for timers.
    pub item: Option<u16>,
    /// PCP instance id. Defaults to [`INSTANCE_DOMAIN_NULL`].
    pub instance: Option<i32>,
}

/// One physical, directly-addressable metric slot after expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicalMetric {
    /// Fully expanded name (`"{name}.{field}"` for timer sub-fields).
    pub name: String,
    /// PCP cluster id.
    pub cluster: u16,
    /// PCP item id, auto-incremented across a timer's 8 sub-fields.
    pub item: u16,
    /// PCP instance id.
    pub instance: i32,
    /// Always [`TypeCode::U32`] in this version; kept explicit for clarity
    /// and to match the index entry's `type` field.
    pub type_code: TypeCode,
}

/// Field name suffixes for a timer's 8 physical slots, in item-id order.
pub const TIMER_FIELD_NAMES: [&str; 8] = [
    "service_time",
    "time_taken_0",
    "time_taken_1",
    "time_taken_2",
    "time_taken_3",
    "time_taken_4",
    "time_taken_5",
    "timings_count",
];

fn triple_hash(cluster: u16, item: u16, instance: i32) -> String {
    let mut hasher = Md5::new();
    hasher.update(format!("{cluster}:{item}:{instance}"));
    format!("{:x}", hasher.finalize())
}

/// Resolve a config's defaulted `(item, instance)` pair and validate ranges,
/// per the ordered rule list below (everything up to but not including the
/// triple/name dedup checks, which need registry-wide state).
fn validate_and_resolve(cfg: &MetricConfig) -> Result<(u16, i32), String> {
    if cfg.name.trim().is_empty() {
        return Err(format!("metric with cluster {} has an empty name", cfg.cluster));
    }

    let item = match cfg.kind {
        MetricKind::Timer => cfg.item.unwrap_or(0),
        MetricKind::Counter => cfg.item.ok_or_else(|| {
            format!("counter '{}' is missing a required pcp_item", cfg.name)
        })?,
    };

    let instance = cfg.instance.unwrap_or(INSTANCE_DOMAIN_NULL);

    Ok((item, instance))
}

fn expand(cfg: &MetricConfig, item: u16, instance: i32) -> Vec<PhysicalMetric> {
    match cfg.kind {
        MetricKind::Counter => vec![PhysicalMetric {
            name: cfg.name.clone(),
            cluster: cfg.cluster,
            item,
            instance,
            type_code: TypeCode::U32,
        }],
        MetricKind::Timer => TIMER_FIELD_NAMES
            .iter()
            .enumerate()
            .map(|(k, field)| PhysicalMetric {
                name: format!("{}.{field}", cfg.name),
                cluster: cfg.cluster,
                item: item + k as u16,
                instance,
                type_code: TypeCode::U32,
            })
            .collect(),
    }
}

/// The expanded, validated set of physical metrics for one store instance.
pub struct MetricsRegistry {
    physical: Vec<PhysicalMetric>,
}

impl MetricsRegistry {
    /// Build a registry from `configs`. In development mode, applies the
    /// full validation and dedup pipeline, logging and dropping offenders;
    /// otherwise configs are trusted and expanded directly.
    pub fn build(configs: &[MetricConfig], development_mode: bool) -> Self {
        let mut physical = Vec::new();
        let mut seen_triples: HashSet<String> = HashSet::new();
        let mut seen_names: HashSet<String> = HashSet::new();

        for cfg in configs {
            let (item, instance) = if development_mode {
                match validate_and_resolve(cfg) {
                    Ok(resolved) => resolved,
                    Err(reason) => {
                        tracing::warn!(metric = %cfg.name, %reason, "dropping invalid metric config");
                        continue;
                    }
                }
            } else {
                (cfg.item.unwrap_or(0), cfg.instance.unwrap_or(INSTANCE_DOMAIN_NULL))
            };

            if development_mode {
                let hash = triple_hash(cfg.cluster, item, instance);
                if !seen_triples.insert(hash) {
                    tracing::warn!(
                        metric = %cfg.name,
                        cluster = cfg.cluster,
                        item,
                        instance,
                        "dropping metric with duplicate (cluster, item, instance) triple"
                    );
                    continue;
                }
            }

            for phys in expand(cfg, item, instance) {
                if development_mode && !seen_names.insert(phys.name.clone()) {
                    tracing::warn!(
                        name = %phys.name,
                        "duplicate physical metric name, keeping first registration"
                    );
                    continue;
                }
                physical.push(phys);
            }
        }

        Self { physical }
    }

    /// All physical metrics this registry resolved to, in registration order.
    pub fn physical_metrics(&self) -> &[PhysicalMetric] {
        &self.physical
    }

    /// Number of physical metrics, used to size the segment pair.
    pub fn len(&self) -> usize {
        self.physical.len()
    }

    /// Whether this registry expanded to zero physical metrics.
    pub fn is_empty(&self) -> bool {
        self.physical.is_empty()
    }

    /// Look up a physical metric's declared layout by its expanded name.
    pub fn find(&self, name: &str) -> Option<&PhysicalMetric> {
        self.physical.iter().find(|m| m.name == name)
    }
}
