//! Core data model shared by collectors, the monitoring core and the push channel

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metric name → value pairs produced by one collector tick
pub type MetricValues = BTreeMap<String, f64>;

/// One timestamped snapshot produced by a collector
///
/// Sample sets are never mutated after creation; the store only hands out
/// clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleSet {
    pub collector_id: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,

    pub values: MetricValues,
}

impl SampleSet {
    pub fn new(collector_id: impl Into<String>, timestamp: DateTime<Utc>, values: MetricValues) -> Self {
        Self {
            collector_id: collector_id.into(),
            timestamp,
            values,
        }
    }

    pub fn value(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }
}

/// Severity of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Lowercase name, used for topic suffixes and query parameters
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "critical" => Ok(AlertLevel::Critical),
            other => Err(format!("unknown alert level `{other}`")),
        }
    }
}

/// Which configured boundary a threshold alert crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdBound {
    Critical,
    Warning,
    Low,
}

impl ThresholdBound {
    pub fn level(&self) -> AlertLevel {
        match self {
            ThresholdBound::Critical => AlertLevel::Critical,
            ThresholdBound::Warning | ThresholdBound::Low => AlertLevel::Warning,
        }
    }
}

impl fmt::Display for ThresholdBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdBound::Critical => write!(f, "critical"),
            ThresholdBound::Warning => write!(f, "warning"),
            ThresholdBound::Low => write!(f, "low"),
        }
    }
}

/// Why an alert was raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AlertReason {
    Threshold {
        bound: ThresholdBound,
        limit: f64,
    },
    Anomaly {
        mean: f64,
        #[serde(rename = "stdDev")]
        std_dev: f64,
        sigma: f64,
        #[serde(rename = "expectedRange")]
        expected_range: [f64; 2],
    },
}

/// Alert as produced by the threshold engine or anomaly detector, before the
/// router has assigned an id
#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub level: AlertLevel,
    pub collector_id: String,
    pub metric: String,
    pub value: f64,
    pub reason: AlertReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl AlertDraft {
    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            collector_id: self.collector_id.clone(),
            metric: self.metric.clone(),
            timestamp: self.timestamp,
            anomaly: self.is_anomaly(),
        }
    }

    pub fn is_anomaly(&self) -> bool {
        matches!(self.reason, AlertReason::Anomaly { .. })
    }
}

/// Identity of an alert: two alerts for the same metric sample are the same alert
///
/// Threshold and anomaly alerts are deduplicated in separate scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertIdentity {
    pub collector_id: String,
    pub metric: String,
    pub timestamp: DateTime<Utc>,
    pub anomaly: bool,
}

/// A routed alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub level: AlertLevel,
    pub collector_id: String,
    pub metric: String,
    pub value: f64,
    #[serde(rename = "thresholdOrReason")]
    pub reason: AlertReason,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub anomaly: bool,

    /// Must additionally be delivered by an external notifier
    pub out_of_band: bool,
}

impl Alert {
    pub fn from_draft(id: Uuid, draft: AlertDraft) -> Self {
        let anomaly = draft.is_anomaly();
        let out_of_band = draft.level == AlertLevel::Critical;

        Self {
            id,
            level: draft.level,
            collector_id: draft.collector_id,
            metric: draft.metric,
            value: draft.value,
            reason: draft.reason,
            message: draft.message,
            timestamp: draft.timestamp,
            anomaly,
            out_of_band,
        }
    }

    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            collector_id: self.collector_id.clone(),
            metric: self.metric.clone(),
            timestamp: self.timestamp,
            anomaly: self.anomaly,
        }
    }
}

/// Activity/usage record published by the business layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub user_id: String,
    pub activity_type: String,

    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ActivityEvent {
    pub fn new(user_id: impl Into<String>, activity_type: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            activity_type: activity_type.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}
