//! Push-channel wire format
//!
//! Every frame is a JSON object tagged by an uppercase `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::SystemStatus;
use crate::model::{Alert, AlertLevel, MetricValues, SampleSet};

/// Every metric sample set, regardless of collector
pub const METRICS_TOPIC: &str = "metrics";

/// Every routed alert, regardless of level
pub const ALERTS_TOPIC: &str = "alerts";

/// Periodic status snapshots
pub const SYSTEM_TOPIC: &str = "system";

/// Topic carrying the samples of a single collector
pub fn metrics_topic(collector_id: &str) -> String {
    format!("{METRICS_TOPIC}:{collector_id}")
}

/// Topic carrying alerts of a single level
pub fn alerts_topic(level: AlertLevel) -> String {
    format!("{ALERTS_TOPIC}:{}", level.as_str())
}

/// Messages accepted from a client
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum InboundMessage {
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
    Unsubscribe {
        #[serde(default)]
        channels: Vec<String>,
    },
    Ping,
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a text frame; anything that is not a known message is `Unknown`
    pub fn parse(text: &str) -> Self {
        serde_json::from_str(text).unwrap_or(InboundMessage::Unknown)
    }
}

/// Alert as carried by an `ALERT` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: Uuid,
    pub level: AlertLevel,
    pub monitor: String,
    pub metric: String,
    pub value: f64,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub anomaly: bool,
}

impl From<&Alert> for AlertPayload {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id,
            level: alert.level,
            monitor: alert.collector_id.clone(),
            metric: alert.metric.clone(),
            value: alert.value,
            message: alert.message.clone(),
            timestamp: alert.timestamp,
            anomaly: alert.anomaly,
        }
    }
}

/// Messages sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum OutboundMessage {
    #[serde(rename_all = "camelCase")]
    Welcome {
        connection_id: Uuid,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    Pong {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    Metrics {
        monitor: String,
        data: MetricValues,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
    Alert {
        data: AlertPayload,
    },
    Status {
        data: Box<SystemStatus>,
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },
}

impl OutboundMessage {
    pub fn metrics(sample: &SampleSet) -> Self {
        OutboundMessage::Metrics {
            monitor: sample.collector_id.clone(),
            data: sample.values.clone(),
            timestamp: sample.timestamp,
        }
    }

    pub fn alert(alert: &Alert) -> Self {
        OutboundMessage::Alert {
            data: AlertPayload::from(alert),
        }
    }

    pub fn status(status: SystemStatus) -> Self {
        let timestamp = status.timestamp;
        OutboundMessage::Status {
            data: Box::new(status),
            timestamp,
        }
    }

    /// Serialized text frame
    pub fn to_frame(&self) -> String {
        // Serializing these types cannot fail: all map keys are strings
        serde_json::to_string(self).unwrap_or_default()
    }
}
