//! Message types for actor communication
//!
//! Collector actors submit [`CollectorEvent`]s through one bounded queue to the
//! monitor actor, which is the only writer of the monitoring core. Control and
//! queries use per-actor command channels with oneshot replies.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::oneshot;

use crate::core::SystemStatus;
use crate::core::router::AlertRecord;
use crate::core::store::MetricAggregate;
use crate::core::sweeper::SweepReport;
use crate::core::threshold::Threshold;
use crate::error::MonitorResult;
use crate::model::{Alert, AlertLevel, SampleSet};

/// Output of one collector tick
#[derive(Debug, Clone)]
pub enum CollectorEvent {
    Sample(SampleSet),

    /// The collector errored or timed out; nothing was collected this tick
    Failed {
        collector_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// Commands that can be sent to a collector actor
#[derive(Debug)]
pub enum CollectorCommand {
    /// Collect immediately, bypassing the interval timer
    PollNow {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    /// Replace the polling interval; the ticker restarts
    UpdateInterval { interval_ms: u64 },

    Shutdown,
}

/// Commands that can be sent to the monitor actor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Append and evaluate a sample outside of the collector queue
    Ingest {
        sample: SampleSet,
        respond_to: oneshot::Sender<MonitorResult<Vec<Alert>>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<SystemStatus>,
    },

    GetMetrics {
        collector_id: Option<String>,
        since: Duration,
        respond_to: oneshot::Sender<Vec<SampleSet>>,
    },

    GetAlerts {
        level: Option<AlertLevel>,
        since: Duration,
        respond_to: oneshot::Sender<Vec<AlertRecord>>,
    },

    GetAggregate {
        collector_id: String,
        window: Duration,
        respond_to: oneshot::Sender<BTreeMap<String, MetricAggregate>>,
    },

    SetThreshold {
        collector_id: String,
        metric: String,
        threshold: Threshold,
        respond_to: oneshot::Sender<Option<Threshold>>,
    },

    RemoveThreshold {
        collector_id: String,
        metric: String,
        respond_to: oneshot::Sender<Option<Threshold>>,
    },

    /// Run an anomaly pass now
    DetectAnomalies {
        respond_to: oneshot::Sender<Vec<Alert>>,
    },

    /// Run a retention sweep now
    Sweep {
        respond_to: oneshot::Sender<SweepReport>,
    },

    /// Stop after the current step; the reply is sent once the loop has exited
    Shutdown { respond_to: oneshot::Sender<()> },
}
