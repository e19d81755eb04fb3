//! Request and response types of the query surface

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::router::AlertRecord;
use crate::core::store::MetricAggregate;
use crate::model::{ActivityEvent, SampleSet};
use crate::push::registry::ConnectionInfo;

/// Range used when a query does not name one
pub const DEFAULT_RANGE_MS: u64 = 60 * 60 * 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    pub monitor: Option<String>,
    pub range_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub monitor: Option<String>,
    pub range_ms: u64,
    pub count: usize,
    pub samples: Vec<SampleSet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateQuery {
    pub window_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResponse {
    pub monitor: String,
    pub window_ms: u64,
    pub metrics: BTreeMap<String, MetricAggregate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsQuery {
    pub level: Option<String>,
    pub range_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub range_ms: u64,
    pub count: usize,
    pub alerts: Vec<AlertRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionsResponse {
    pub count: usize,
    pub connections: Vec<ConnectionInfo>,
}

/// One event or a batch
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ActivityRequest {
    Batch(Vec<ActivityEvent>),
    Single(ActivityEvent),
}

impl ActivityRequest {
    pub fn into_events(self) -> Vec<ActivityEvent> {
        match self {
            ActivityRequest::Batch(events) => events,
            ActivityRequest::Single(event) => vec![event],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityResponse {
    pub accepted: usize,
}
