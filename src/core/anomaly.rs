//! Statistical anomaly detection over the recent window of each metric

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace};

use crate::clock::cutoff;
use crate::config::Config;
use crate::core::store::MetricStore;
use crate::model::{AlertDraft, AlertLevel, AlertReason};

/// Deviations beyond this multiple of the anomaly limit are CRITICAL
const CRITICAL_FACTOR: f64 = 1.5;

/// Mean and population standard deviation of a value window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowStats {
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl WindowStats {
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let count = values.len() as f64;
        let mean = values.iter().sum::<f64>() / count;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

        Some(Self {
            mean,
            std_dev: variance.sqrt(),
            sample_count: values.len(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnomalyConfig {
    pub sigma: f64,
    pub window: Duration,
    pub min_samples: usize,
}

impl From<&Config> for AnomalyConfig {
    fn from(config: &Config) -> Self {
        Self {
            sigma: config.anomaly_threshold_sigma,
            window: config.anomaly_window(),
            min_samples: config.anomaly_min_samples,
        }
    }
}

#[derive(Debug)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    /// One detection pass over every `(collector, metric)` series
    ///
    /// Drafts are unique by identity within the pass. Cooldowns do not apply.
    pub fn detect(&self, store: &MetricStore, now: DateTime<Utc>) -> Vec<AlertDraft> {
        let cutoff = cutoff(now, self.config.window);
        let mut drafts = vec![];
        let mut seen = HashSet::new();

        let mut collectors: Vec<&str> = store.collector_ids().collect();
        collectors.sort_unstable();

        for collector_id in collectors {
            let mut series: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
            for sample in store.window(collector_id, cutoff) {
                for (metric, value) in sample.values.iter().filter(|(_, value)| value.is_finite()) {
                    series
                        .entry(metric.as_str())
                        .or_default()
                        .push((sample.timestamp, *value));
                }
            }

            for (metric, points) in series {
                if points.len() < self.config.min_samples {
                    trace!(
                        "skipping anomaly check for {collector_id}.{metric}: {} of {} samples",
                        points.len(),
                        self.config.min_samples
                    );
                    continue;
                }

                let values: Vec<f64> = points.iter().map(|(_, value)| *value).collect();
                let Some(stats) = WindowStats::compute(&values) else {
                    continue;
                };

                for draft in self.flag(collector_id, metric, &points, stats) {
                    if seen.insert(draft.identity()) {
                        drafts.push(draft);
                    }
                }
            }
        }

        if !drafts.is_empty() {
            debug!("anomaly pass flagged {} value(s)", drafts.len());
        }
        drafts
    }

    fn flag(
        &self,
        collector_id: &str,
        metric: &str,
        points: &[(DateTime<Utc>, f64)],
        stats: WindowStats,
    ) -> Vec<AlertDraft> {
        let limit = self.config.sigma * stats.std_dev;
        let expected_range = [stats.mean - limit, stats.mean + limit];

        points
            .iter()
            .filter_map(|&(timestamp, value)| {
                let deviation = (value - stats.mean).abs();
                if deviation <= limit {
                    return None;
                }

                let level = if deviation > CRITICAL_FACTOR * limit {
                    AlertLevel::Critical
                } else {
                    AlertLevel::Warning
                };

                Some(AlertDraft {
                    level,
                    collector_id: collector_id.to_string(),
                    metric: metric.to_string(),
                    value,
                    reason: AlertReason::Anomaly {
                        mean: stats.mean,
                        std_dev: stats.std_dev,
                        sigma: self.config.sigma,
                        expected_range,
                    },
                    message: format!(
                        "{collector_id}.{metric} = {value:.2} deviates from mean {:.2} (expected {:.2}..{:.2})",
                        stats.mean, expected_range[0], expected_range[1]
                    ),
                    timestamp,
                })
            })
            .collect()
    }
}
