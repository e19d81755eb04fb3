//! Per-metric threshold evaluation with cooldown suppression

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::clock::cutoff;
use crate::config::ThresholdConfig;
use crate::model::{AlertDraft, AlertReason, SampleSet, ThresholdBound};

/// Key for both the threshold table and the cooldown records
type MetricKey = (String, String);

/// Bounds configured for a single metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Threshold {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
}

impl Threshold {
    /// First matching bound in `critical`, `warning`, `low` order
    pub fn classify(&self, value: f64) -> Option<(ThresholdBound, f64)> {
        if let Some(limit) = self.critical
            && value >= limit
        {
            return Some((ThresholdBound::Critical, limit));
        }
        if let Some(limit) = self.warning
            && value >= limit
        {
            return Some((ThresholdBound::Warning, limit));
        }
        if let Some(limit) = self.low
            && value <= limit
        {
            return Some((ThresholdBound::Low, limit));
        }
        None
    }
}

impl From<&ThresholdConfig> for Threshold {
    fn from(config: &ThresholdConfig) -> Self {
        Self {
            warning: config.warning,
            critical: config.critical,
            low: config.low,
        }
    }
}

/// At most one threshold per `(collector, metric)`
#[derive(Debug, Clone, Default)]
pub struct ThresholdTable {
    entries: HashMap<MetricKey, Threshold>,
}

impl ThresholdTable {
    pub fn from_config(thresholds: &[ThresholdConfig]) -> Self {
        let entries = thresholds
            .iter()
            .map(|t| ((t.collector.clone(), t.metric.clone()), Threshold::from(t)))
            .collect();
        Self { entries }
    }

    pub fn get(&self, collector_id: &str, metric: &str) -> Option<&Threshold> {
        self.entries
            .get(&(collector_id.to_string(), metric.to_string()))
    }

    /// Insert or replace; returns the previous threshold
    pub fn set(&mut self, collector_id: &str, metric: &str, threshold: Threshold) -> Option<Threshold> {
        self.entries
            .insert((collector_id.to_string(), metric.to_string()), threshold)
    }

    pub fn remove(&mut self, collector_id: &str, metric: &str) -> Option<Threshold> {
        self.entries
            .remove(&(collector_id.to_string(), metric.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Evaluates fresh samples against the threshold table
#[derive(Debug)]
pub struct ThresholdEngine {
    table: ThresholdTable,
    cooldown: Duration,
    cooldowns: HashMap<MetricKey, DateTime<Utc>>,
    suppressed: u64,
}

impl ThresholdEngine {
    pub fn new(table: ThresholdTable, cooldown: Duration) -> Self {
        Self {
            table,
            cooldown,
            cooldowns: HashMap::new(),
            suppressed: 0,
        }
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut ThresholdTable {
        &mut self.table
    }

    /// Number of matches swallowed by an active cooldown
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn last_fired(&self, collector_id: &str, metric: &str) -> Option<DateTime<Utc>> {
        self.cooldowns
            .get(&(collector_id.to_string(), metric.to_string()))
            .copied()
    }

    /// Check every value of `sample` and return the drafts that should be routed
    ///
    /// A match fires when there is no cooldown record for the metric or the
    /// record is strictly older than `now - cooldown`.
    pub fn evaluate(&mut self, sample: &SampleSet, now: DateTime<Utc>) -> Vec<AlertDraft> {
        let mut drafts = vec![];

        for (metric, &value) in &sample.values {
            let key = (sample.collector_id.clone(), metric.clone());
            let Some(threshold) = self.table.entries.get(&key) else {
                continue;
            };
            let Some((bound, limit)) = threshold.classify(value) else {
                continue;
            };

            if let Some(last) = self.cooldowns.get(&key)
                && *last >= cutoff(now, self.cooldown)
            {
                trace!(
                    "suppressing {bound} alert for {}.{metric}, last fired at {last}",
                    sample.collector_id
                );
                self.suppressed += 1;
                continue;
            }

            debug!(
                "{}.{metric} = {value} crossed {bound} threshold {limit}",
                sample.collector_id
            );
            self.cooldowns.insert(key, now);

            let comparison = match bound {
                ThresholdBound::Low => "below",
                _ => "above",
            };
            drafts.push(AlertDraft {
                level: bound.level(),
                collector_id: sample.collector_id.clone(),
                metric: metric.clone(),
                value,
                reason: AlertReason::Threshold { bound, limit },
                message: format!(
                    "{}.{metric} is {comparison} {bound} threshold: {value} (limit {limit})",
                    sample.collector_id
                ),
                timestamp: sample.timestamp,
            });
        }

        drafts
    }

    /// Forget cooldown records last updated before `retention_cutoff`
    ///
    /// Records still inside the cooldown window at `now` are kept regardless.
    pub fn prune_cooldowns(&mut self, retention_cutoff: DateTime<Utc>, now: DateTime<Utc>) -> usize {
        let keep_from = retention_cutoff.min(cutoff(now, self.cooldown));
        let before = self.cooldowns.len();
        self.cooldowns.retain(|_, last| *last >= keep_from);
        before - self.cooldowns.len()
    }
}
