//! Monitoring core: the single-writer owner of the metric store, threshold
//! cooldowns and the alert buffer
//!
//! Every operation takes `now` explicitly; the periodic drivers in
//! [`crate::actors`] read it from an injected [`crate::clock::Clock`].

pub mod anomaly;
pub mod router;
pub mod store;
pub mod sweeper;
pub mod threshold;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::MonitorResult;
use crate::model::{Alert, AlertLevel, SampleSet};

use self::anomaly::{AnomalyConfig, AnomalyDetector};
use self::router::{AlertCounters, AlertRecord, AlertRouter, DeliveryStatus};
use self::store::{MetricAggregate, MetricStore};
use self::sweeper::{RetentionSweeper, SweepReport, SweepStats};
use self::threshold::{Threshold, ThresholdEngine, ThresholdTable};

/// Per-collector bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorStats {
    pub samples: u64,
    pub errors: u64,
    pub rejected: u64,

    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_sample_at: Option<DateTime<Utc>>,

    pub last_error: Option<String>,
}

/// Snapshot returned by the status query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: i64,
    pub collectors: BTreeMap<String, CollectorStats>,
    pub series: usize,
    pub samples: usize,
    pub buffered_alerts: usize,
    pub alerts: AlertCounters,
    pub suppressed_alerts: u64,
    pub thresholds: usize,
    pub connections: usize,
    pub sweeper: SweepStats,
}

#[derive(Debug)]
pub struct MonitorCore {
    store: MetricStore,
    thresholds: ThresholdEngine,
    anomaly: AnomalyDetector,
    router: AlertRouter,
    sweeper: RetentionSweeper,
    collectors: HashMap<String, CollectorStats>,
    started_at: DateTime<Utc>,
}

impl MonitorCore {
    pub fn new(config: &Config, now: DateTime<Utc>) -> Self {
        let table = ThresholdTable::from_config(&config.thresholds);

        Self {
            store: MetricStore::new(),
            thresholds: ThresholdEngine::new(table, config.alert_cooldown()),
            anomaly: AnomalyDetector::new(AnomalyConfig::from(config)),
            router: AlertRouter::new(config.max_alerts),
            sweeper: RetentionSweeper::new(config.retention()),
            collectors: HashMap::new(),
            started_at: now,
        }
    }

    /// Append a sample and evaluate it against the threshold table
    ///
    /// Returns the alerts routed as a result, in metric-name order.
    pub fn ingest(&mut self, sample: SampleSet, now: DateTime<Utc>) -> MonitorResult<Vec<Alert>> {
        let collector_id = sample.collector_id.clone();

        if let Err(err) = self.store.append(sample.clone()) {
            warn!("rejecting sample: {err}");
            self.collectors.entry(collector_id).or_default().rejected += 1;
            return Err(err);
        }

        let stats = self.collectors.entry(collector_id).or_default();
        stats.samples += 1;
        stats.last_sample_at = Some(sample.timestamp);

        let alerts = self
            .thresholds
            .evaluate(&sample, now)
            .into_iter()
            .filter_map(|draft| self.router.route(draft))
            .collect();
        Ok(alerts)
    }

    /// Count a failed or timed out collection tick
    pub fn record_failure(&mut self, collector_id: &str, reason: impl Into<String>) {
        let stats = self.collectors.entry(collector_id.to_string()).or_default();
        stats.errors += 1;
        stats.last_error = Some(reason.into());
    }

    /// Run one anomaly detection pass and route whatever it flags
    pub fn detect_anomalies(&mut self, now: DateTime<Utc>) -> Vec<Alert> {
        self.anomaly
            .detect(&self.store, now)
            .into_iter()
            .filter_map(|draft| self.router.route(draft))
            .collect()
    }

    pub fn sweep(&mut self, now: DateTime<Utc>) -> SweepReport {
        self.sweeper
            .sweep(now, &mut self.store, &mut self.router, &mut self.thresholds)
    }

    pub fn metrics(&self, collector_id: Option<&str>, since: Duration, now: DateTime<Utc>) -> Vec<SampleSet> {
        self.store.query(collector_id, since, now)
    }

    pub fn alerts(&self, level: Option<AlertLevel>, since: Duration, now: DateTime<Utc>) -> Vec<AlertRecord> {
        self.router.recent(level, since, now)
    }

    pub fn aggregate(
        &self,
        collector_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, MetricAggregate> {
        self.store.aggregate(collector_id, window, now)
    }

    pub fn alert(&self, id: &Uuid) -> Option<&AlertRecord> {
        self.router.get(id)
    }

    pub fn mark_delivery(&mut self, id: Uuid, status: DeliveryStatus) {
        if !self.router.mark_delivery(id, status) {
            trace!("delivery status for evicted alert {id} dropped");
        }
    }

    pub fn set_threshold(&mut self, collector_id: &str, metric: &str, threshold: Threshold) -> Option<Threshold> {
        self.thresholds.table_mut().set(collector_id, metric, threshold)
    }

    pub fn remove_threshold(&mut self, collector_id: &str, metric: &str) -> Option<Threshold> {
        self.thresholds.table_mut().remove(collector_id, metric)
    }

    pub fn status(&self, now: DateTime<Utc>, connections: usize) -> SystemStatus {
        SystemStatus {
            timestamp: now,
            uptime_secs: (now - self.started_at).num_seconds(),
            collectors: self
                .collectors
                .iter()
                .map(|(id, stats)| (id.clone(), stats.clone()))
                .collect(),
            series: self.store.series_count(),
            samples: self.store.len(),
            buffered_alerts: self.router.len(),
            alerts: self.router.counters(),
            suppressed_alerts: self.thresholds.suppressed(),
            thresholds: self.thresholds.table().len(),
            connections,
            sweeper: self.sweeper.stats(),
        }
    }
}
