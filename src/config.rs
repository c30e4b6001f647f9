//! Configuration surface: serde-derived structs loadable from TOML.
//! Programmatic construction of [`StoreConfig`] values (no file on disk)
//! remains the primary path exercised by the rest of the crate and its
//! tests; [`load_config`] exists for binaries that want to externalize
//! settings.

use crate::error::ConfigError;
use crate::registry::{MetricConfig, MetricKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whether a store instance may write to its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreMode {
    /// Segments are opened for reading only; `set`/`increment`/`timing`
    /// become no-ops.
    ReadOnly,
    /// Segments are created if absent and fully writable.
    ReadWrite,
}

/// One metric declaration as it appears in a TOML config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMetricConfig {
    /// `"counter"` or `"timer"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Logical metric name.
    pub name: String,
    /// PCP cluster id.
    pub pcp_cluster: u16,
    /// PCP item id. Required for counters; defaults to 0 for timers.
    #[serde(default)]
    pub pcp_item: Option<u16>,
    /// PCP instance id. Defaults to [`crate::consts::INSTANCE_DOMAIN_NULL`].
    #[serde(default)]
    pub pcp_instance: Option<i32>,
}

impl TryFrom<&RawMetricConfig> for MetricConfig {
    type Error = ConfigError;

    fn try_from(raw: &RawMetricConfig) -> Result<Self, Self::Error> {
        let kind = match raw.kind.as_str() {
            "counter" => MetricKind::Counter,
            "timer" => MetricKind::Timer,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "metric '{}' has unknown type '{other}', expected 'counter' or 'timer'",
                    raw.name
                )))
            }
        };
        Ok(MetricConfig {
            kind,
            name: raw.name.clone(),
            cluster: raw.pcp_cluster,
            item: raw.pcp_item,
            instance: raw.pcp_instance,
        })
    }
}

/// Top-level store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base name used to derive the rendezvous file path.
    pub name: String,
    /// Discriminator appended to `name` when deriving the rendezvous path,
    /// so that two registries sharing `(name, identifier)` address the same
    /// segments. Defaults to empty.
    #[serde(default)]
    pub identifier: String,
    /// Declared metrics, expanded by [`crate::registry::MetricsRegistry`].
    pub metrics: Vec<RawMetricConfig>,
    /// Schema version written into the index header.
    pub version: u32,
    /// Whether this instance may write to its segments.
    pub mode: StoreMode,
    /// Whether to run the full validation/dedup pipeline on construction.
    #[serde(default)]
    pub development_mode: bool,
}

impl StoreConfig {
    /// Validate the top-level fields that aren't checked per-metric by the
    /// registry: a version of 0 would never pass the header's
    /// "uninitialized" sentinel check, so it is rejected up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 {
            return Err(ConfigError::ValidationError(
                "version must be >= 1 (0 means 'uninitialized' in the index header)".into(),
            ));
        }
        Ok(())
    }

    /// Convert the declared metrics into the registry's input type,
    /// skipping (and logging) any entry whose `type` field isn't recognized.
    /// Per-field range validation happens later, inside
    /// [`crate::registry::MetricsRegistry::build`].
    pub fn metric_configs(&self) -> Vec<MetricConfig> {
        self.metrics
            .iter()
            .filter_map(|raw| match MetricConfig::try_from(raw) {
                Ok(cfg) => Some(cfg),
                Err(reason) => {
                    tracing::warn!(metric = %raw.name, %reason, "dropping metric with unrecognized type");
                    None
                }
            })
            .collect()
    }
}

/// Load and validate a [`StoreConfig`] from a TOML file at `path`.
pub fn load_config(path: &Path) -> Result<StoreConfig, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileNotFound(format!("{}: {e}", path.display())))?;
    let config: StoreConfig =
        toml::from_str(&text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_toml_config() {
        let toml_text = r#"
            name = "myapp"
            version = 1
            mode = "read-write"
            development_mode = true

            [[metrics]]
            type = "counter"
            name = "requests"
            pcp_cluster = 0
            pcp_item = 1

            [[metrics]]
            type = "timer"
            name = "db_query"
            pcp_cluster = 0
        "#;
        let config: StoreConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.name, "myapp");
        assert_eq!(config.metrics.len(), 2);
        assert!(config.development_mode);
        config.validate().unwrap();
    }

    #[test]
    fn zero_version_fails_validation() {
        let config = StoreConfig {
            name: "x".into(),
            identifier: String::new(),
            metrics: vec![],
            version: 0,
            mode: StoreMode::ReadWrite,
            development_mode: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_metric_type_is_skipped_not_fatal() {
        let config = StoreConfig {
            name: "x".into(),
            identifier: String::new(),
            metrics: vec![RawMetricConfig {
                kind: "gauge".into(),
                name: "weird".into(),
                pcp_cluster: 0,
                pcp_item: None,
                pcp_instance: None,
            }],
            version: 1,
            mode: StoreMode::ReadWrite,
            development_mode: false,
        };
        assert!(config.metric_configs().is_empty());
    }

    #[test]
    fn load_config_reports_missing_file() {
        let result = load_config(Path::new("/nonexistent/path/does-not-exist.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
