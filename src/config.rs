use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use chrono::Duration;
use thiserror::Error;
use tracing::trace;

/// Upper bound for every configured period or span (100 years)
pub const MAX_SPAN_MS: u64 = 100 * 365 * 24 * 60 * 60 * 1_000;

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("duplicate threshold for `{collector}.{metric}`")]
    DuplicateThreshold { collector: String, metric: String },

    #[error("threshold for `{collector}.{metric}` defines no bound")]
    EmptyThreshold { collector: String, metric: String },

    #[error("duplicate collector id `{0}`")]
    DuplicateCollector(String),

    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Top-level hub configuration
///
/// Every key is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Collection tick for every collector
    pub monitoring_interval_ms: u64,

    /// Samples and alerts older than this are purged by the sweeper
    pub metrics_retention_ms: u64,

    /// Minimum distance between two threshold alerts for the same metric
    pub alert_cooldown_ms: u64,

    /// Deviation multiple (in standard deviations) that counts as an anomaly
    pub anomaly_threshold_sigma: f64,

    /// Look-back window for anomaly statistics
    pub anomaly_window_ms: u64,

    /// Period of the anomaly detection pass
    pub anomaly_interval_ms: u64,

    /// Minimum number of values before a series is evaluated for anomalies
    pub anomaly_min_samples: usize,

    /// Period of the retention sweeper
    pub cleanup_interval_ms: u64,

    /// Period of the status broadcast on the `system` topic
    pub aggregation_interval_ms: u64,

    /// Upper bound for a single collector call
    pub collector_timeout_ms: u64,

    /// Capacity of the recent-alert buffer
    pub max_alerts: usize,

    pub thresholds: Vec<ThresholdConfig>,

    pub collectors: Vec<CollectorConfig>,

    pub api: ApiSettings,

    pub notifier: Option<NotifierConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitoring_interval_ms: 1_000,
            metrics_retention_ms: 24 * 60 * 60 * 1_000,
            alert_cooldown_ms: 5 * 60 * 1_000,
            anomaly_threshold_sigma: 2.5,
            anomaly_window_ms: 60 * 60 * 1_000,
            anomaly_interval_ms: 5 * 60 * 1_000,
            anomaly_min_samples: 10,
            cleanup_interval_ms: 60 * 60 * 1_000,
            aggregation_interval_ms: 30 * 1_000,
            collector_timeout_ms: 5_000,
            max_alerts: 1_000,
            thresholds: vec![],
            collectors: vec![],
            api: ApiSettings::default(),
            notifier: None,
        }
    }
}

impl Config {
    pub fn monitoring_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.monitoring_interval_ms)
    }

    pub fn collector_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.collector_timeout_ms)
    }

    pub fn anomaly_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.anomaly_interval_ms)
    }

    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn aggregation_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.aggregation_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        millis(self.metrics_retention_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        millis(self.alert_cooldown_ms)
    }

    pub fn anomaly_window(&self) -> Duration {
        millis(self.anomaly_window_ms)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("monitoringIntervalMs", self.monitoring_interval_ms),
            ("anomalyIntervalMs", self.anomaly_interval_ms),
            ("cleanupIntervalMs", self.cleanup_interval_ms),
            ("aggregationIntervalMs", self.aggregation_interval_ms),
            ("collectorTimeoutMs", self.collector_timeout_ms),
        ];
        for (key, value) in periods {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        let spans = [
            ("metricsRetentionMs", self.metrics_retention_ms),
            ("alertCooldownMs", self.alert_cooldown_ms),
            ("anomalyWindowMs", self.anomaly_window_ms),
        ];
        for (key, value) in periods.into_iter().chain(spans) {
            if value > MAX_SPAN_MS {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: format!("{value}ms exceeds the maximum of {MAX_SPAN_MS}ms"),
                });
            }
        }

        if !(self.anomaly_threshold_sigma.is_finite() && self.anomaly_threshold_sigma > 0.0) {
            return Err(ConfigError::InvalidValue {
                key: "anomalyThresholdSigma",
                reason: format!("{} is not a positive number", self.anomaly_threshold_sigma),
            });
        }

        if self.max_alerts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "maxAlerts",
                reason: "must be greater than zero".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for threshold in &self.thresholds {
            if threshold.warning.is_none() && threshold.critical.is_none() && threshold.low.is_none()
            {
                return Err(ConfigError::EmptyThreshold {
                    collector: threshold.collector.clone(),
                    metric: threshold.metric.clone(),
                });
            }
            if !seen.insert((threshold.collector.as_str(), threshold.metric.as_str())) {
                return Err(ConfigError::DuplicateThreshold {
                    collector: threshold.collector.clone(),
                    metric: threshold.metric.clone(),
                });
            }
        }

        let mut ids = HashSet::new();
        for collector in &self.collectors {
            if !ids.insert(collector.id()) {
                return Err(ConfigError::DuplicateCollector(collector.id().to_string()));
            }
        }

        Ok(())
    }
}

fn millis(value: u64) -> Duration {
    Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}

/// One row of the per-metric threshold table
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ThresholdConfig {
    pub collector: String,
    pub metric: String,
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub low: Option<f64>,
}

/// Collector kinds the hub can run
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorConfig {
    /// Host CPU, memory and load
    Resource {
        #[serde(default = "default_resource_id")]
        id: String,
    },

    /// HTTP probe measuring response time
    ApiLatency {
        id: String,
        url: String,
        /// Optional regex the response body must match
        #[serde(default, rename = "expectBody")]
        expect_body: Option<String>,
    },

    /// Business activity events
    Activity {
        #[serde(default = "default_activity_id")]
        id: String,
    },

    /// Security-relevant activity events
    Security {
        #[serde(default = "default_security_id")]
        id: String,
        #[serde(default = "default_security_event_types", rename = "securityEventTypes")]
        event_types: Vec<String>,
    },

    /// Live push-channel connections
    Connections {
        #[serde(default = "default_connections_id")]
        id: String,
    },
}

impl CollectorConfig {
    pub fn id(&self) -> &str {
        match self {
            CollectorConfig::Resource { id }
            | CollectorConfig::ApiLatency { id, .. }
            | CollectorConfig::Activity { id }
            | CollectorConfig::Security { id, .. }
            | CollectorConfig::Connections { id } => id,
        }
    }
}

fn default_resource_id() -> String {
    "resource".to_string()
}

fn default_activity_id() -> String {
    "activity".to_string()
}

fn default_security_id() -> String {
    "security".to_string()
}

fn default_connections_id() -> String {
    "connections".to_string()
}

pub fn default_security_event_types() -> Vec<String> {
    ["login_failed", "permission_denied", "rate_limited"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Query surface / push channel listener settings
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    pub enabled: bool,
    pub bind: SocketAddr,
    pub auth_token: Option<String>,
    pub cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: SocketAddr::from((crate::util::DEFAULT_ADDR, crate::util::DEFAULT_PORT)),
            auth_token: None,
            cors: true,
        }
    }
}

/// Out-of-band delivery handoff for CRITICAL alerts
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierConfig {
    Webhook(Webhook),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&file_content)
        .with_context(|| format!("invalid configuration file {}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    let config: Config = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
