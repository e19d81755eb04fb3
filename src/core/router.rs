//! Alert routing: identity deduplication, bounded recent-alert buffer and
//! delivery bookkeeping

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::clock::cutoff;
use crate::model::{Alert, AlertDraft, AlertIdentity, AlertLevel};

/// Out-of-band delivery state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeliveryStatus {
    NotRequired,
    Pending,
    Delivered,
    Undeliverable,
}

/// Alert together with its delivery state, as returned by queries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    #[serde(flatten)]
    pub alert: Alert,
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCounters {
    pub total: u64,
    pub info: u64,
    pub warning: u64,
    pub critical: u64,
    pub anomalies: u64,
    pub deduplicated: u64,
    pub undeliverable: u64,
}

impl AlertCounters {
    fn record(&mut self, alert: &Alert) {
        self.total += 1;
        match alert.level {
            AlertLevel::Info => self.info += 1,
            AlertLevel::Warning => self.warning += 1,
            AlertLevel::Critical => self.critical += 1,
        }
        if alert.anomaly {
            self.anomalies += 1;
        }
    }
}

#[derive(Debug)]
pub struct AlertRouter {
    capacity: usize,
    order: VecDeque<Uuid>,
    records: HashMap<Uuid, AlertRecord>,
    identities: HashSet<AlertIdentity>,
    last_seen: HashMap<(String, String), Uuid>,
    counters: AlertCounters,
}

impl AlertRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            records: HashMap::new(),
            identities: HashSet::new(),
            last_seen: HashMap::new(),
            counters: AlertCounters::default(),
        }
    }

    /// Freeze a draft into an alert and buffer it
    ///
    /// Returns `None` when an alert with the same identity is already buffered.
    pub fn route(&mut self, draft: AlertDraft) -> Option<Alert> {
        let identity = draft.identity();
        if self.identities.contains(&identity) {
            trace!(
                "dropping duplicate alert for {}.{} at {}",
                identity.collector_id, identity.metric, identity.timestamp
            );
            self.counters.deduplicated += 1;
            return None;
        }

        if self.order.len() >= self.capacity {
            self.evict_oldest();
        }

        let alert = Alert::from_draft(Uuid::new_v4(), draft);
        let delivery = if alert.out_of_band {
            DeliveryStatus::Pending
        } else {
            DeliveryStatus::NotRequired
        };

        debug!(
            "routing {} alert {} for {}.{}",
            alert.level, alert.id, alert.collector_id, alert.metric
        );
        self.counters.record(&alert);
        self.identities.insert(identity);
        self.last_seen
            .insert((alert.collector_id.clone(), alert.metric.clone()), alert.id);
        self.order.push_back(alert.id);
        self.records.insert(
            alert.id,
            AlertRecord {
                alert: alert.clone(),
                delivery,
            },
        );

        Some(alert)
    }

    /// Record the outcome of an out-of-band delivery attempt
    pub fn mark_delivery(&mut self, id: Uuid, status: DeliveryStatus) -> bool {
        let Some(record) = self.records.get_mut(&id) else {
            return false;
        };
        if status == DeliveryStatus::Undeliverable && record.delivery != DeliveryStatus::Undeliverable {
            self.counters.undeliverable += 1;
        }
        record.delivery = status;
        true
    }

    pub fn get(&self, id: &Uuid) -> Option<&AlertRecord> {
        self.records.get(id)
    }

    /// Most recent buffered alert for a metric
    pub fn last_for(&self, collector_id: &str, metric: &str) -> Option<&AlertRecord> {
        self.last_seen
            .get(&(collector_id.to_string(), metric.to_string()))
            .and_then(|id| self.records.get(id))
    }

    /// Buffered alerts not older than `since`, optionally filtered by level,
    /// oldest first
    pub fn recent(&self, level: Option<AlertLevel>, since: Duration, now: DateTime<Utc>) -> Vec<AlertRecord> {
        let cutoff = cutoff(now, since);
        let mut records: Vec<AlertRecord> = self
            .order
            .iter()
            .filter_map(|id| self.records.get(id))
            .filter(|record| record.alert.timestamp >= cutoff)
            .filter(|record| level.is_none_or(|level| record.alert.level == level))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.alert.timestamp);
        records
    }

    /// Drop alerts with `timestamp < cutoff`; returns how many were removed
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale: Vec<Uuid> = self
            .order
            .iter()
            .filter(|id| {
                self.records
                    .get(id)
                    .is_some_and(|record| record.alert.timestamp < cutoff)
            })
            .copied()
            .collect();

        for id in &stale {
            self.forget(id);
        }
        self.order.retain(|id| self.records.contains_key(id));
        stale.len()
    }

    pub fn counters(&self) -> AlertCounters {
        self.counters
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_oldest(&mut self) {
        if let Some(id) = self.order.pop_front() {
            trace!("alert buffer full, evicting {id}");
            self.forget(&id);
        }
    }

    fn forget(&mut self, id: &Uuid) {
        let Some(record) = self.records.remove(id) else {
            return;
        };
        self.identities.remove(&record.alert.identity());

        let key = (record.alert.collector_id.clone(), record.alert.metric.clone());
        if self.last_seen.get(&key) == Some(id) {
            self.last_seen.remove(&key);
        }
    }
}
