//! In-memory metric store
//!
//! One time-ordered series per collector. Appends are O(1) amortized and
//! never reorder existing samples; range lookups use a binary search over the
//! (sorted) series. Age-based eviction is driven exclusively by the retention
//! sweeper through [`MetricStore::evict_before`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::trace;

use crate::clock::cutoff;
use crate::error::{MonitorError, MonitorResult};
use crate::model::SampleSet;

/// On-demand summary of one metric over a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricAggregate {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub last_value: f64,

    /// Sign of `last - first` within the window: -1, 0 or 1
    pub trend_sign: i8,
}

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    count: usize,
    min: f64,
    max: f64,
    sum: f64,
    first: f64,
    last: f64,
}

impl Accumulator {
    fn new(value: f64) -> Self {
        Self {
            count: 1,
            min: value,
            max: value,
            sum: value,
            first: value,
            last: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.last = value;
    }

    fn finish(self) -> MetricAggregate {
        let delta = self.last - self.first;
        let trend_sign = if delta > 0.0 {
            1
        } else if delta < 0.0 {
            -1
        } else {
            0
        };

        MetricAggregate {
            count: self.count,
            min: self.min,
            max: self.max,
            mean: self.sum / self.count as f64,
            last_value: self.last,
            trend_sign,
        }
    }
}

/// Per-collector, time-ordered sample series
#[derive(Debug, Default)]
pub struct MetricStore {
    series: HashMap<String, VecDeque<SampleSet>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to its collector's series
    ///
    /// Samples older than the newest sample of the series are rejected so the
    /// series stays sorted without reordering anything already stored.
    pub fn append(&mut self, sample: SampleSet) -> MonitorResult<()> {
        let series = self.series.entry(sample.collector_id.clone()).or_default();

        if let Some(newest) = series.back()
            && sample.timestamp < newest.timestamp
        {
            return Err(MonitorError::OutOfOrderSample {
                collector_id: sample.collector_id,
                timestamp: sample.timestamp,
                newest: newest.timestamp,
            });
        }

        trace!(
            "appending sample for {} at {} ({} values)",
            sample.collector_id,
            sample.timestamp,
            sample.values.len()
        );
        series.push_back(sample);
        Ok(())
    }

    /// Samples with `timestamp >= now - since`, oldest first
    ///
    /// With no collector given, all series are merged by timestamp (ties are
    /// broken by collector id, and arrival order within a collector is kept).
    pub fn query(&self, collector_id: Option<&str>, since: Duration, now: DateTime<Utc>) -> Vec<SampleSet> {
        let cutoff = cutoff(now, since);

        match collector_id {
            Some(id) => self
                .window(id, cutoff)
                .cloned()
                .collect(),
            None => {
                let mut merged: Vec<SampleSet> = self
                    .series
                    .keys()
                    .flat_map(|id| self.window(id, cutoff))
                    .cloned()
                    .collect();
                merged.sort_by(|a, b| {
                    a.timestamp
                        .cmp(&b.timestamp)
                        .then_with(|| a.collector_id.cmp(&b.collector_id))
                });
                merged
            }
        }
    }

    /// Borrowing iterator over a series from `cutoff` (inclusive) onwards
    pub fn window<'a>(
        &'a self,
        collector_id: &str,
        cutoff: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a SampleSet> + 'a {
        self.series
            .get(collector_id)
            .into_iter()
            .flat_map(move |series| {
                let start = series.partition_point(|sample| sample.timestamp < cutoff);
                series.range(start..)
            })
    }

    /// Per-metric summary of one collector over the last `window`
    pub fn aggregate(
        &self,
        collector_id: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> BTreeMap<String, MetricAggregate> {
        let mut accumulators: BTreeMap<String, Accumulator> = BTreeMap::new();

        for sample in self.window(collector_id, cutoff(now, window)) {
            for (metric, value) in &sample.values {
                match accumulators.get_mut(metric) {
                    Some(acc) => acc.push(*value),
                    None => {
                        accumulators.insert(metric.clone(), Accumulator::new(*value));
                    }
                }
            }
        }

        accumulators
            .into_iter()
            .map(|(metric, acc)| (metric, acc.finish()))
            .collect()
    }

    /// Drop every sample with `timestamp < cutoff`; returns how many were removed
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;

        for series in self.series.values_mut() {
            let stale = series.partition_point(|sample| sample.timestamp < cutoff);
            series.drain(..stale);
            removed += stale;
        }

        self.series.retain(|_, series| !series.is_empty());
        removed
    }

    pub fn latest(&self, collector_id: &str) -> Option<&SampleSet> {
        self.series.get(collector_id).and_then(|series| series.back())
    }

    /// Ids of all collectors with at least one stored sample
    pub fn collector_ids(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    /// Total number of stored samples
    pub fn len(&self) -> usize {
        self.series.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}
