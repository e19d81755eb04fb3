//! Activity events from the business layer
//!
//! The business layer publishes [`ActivityEvent`]s on an [`ActivityFeed`];
//! each activity-based collector holds its own receiver and turns the events
//! seen since its previous tick into counters.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{trace, warn};

use crate::collectors::Collector;
use crate::model::{ActivityEvent, MetricValues};

/// Events buffered per receiver between two ticks
pub const DEFAULT_FEED_CAPACITY: usize = 4_096;

/// Typed fan-out channel for activity events
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    tx: broadcast::Sender<ActivityEvent>,
}

impl ActivityFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event; returns the number of collectors that will see it
    pub fn publish(&self, event: ActivityEvent) -> usize {
        trace!("publishing {} activity for {}", event.activity_type, event.user_id);
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.tx.subscribe()
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

/// Everything buffered in `rx`, plus the number of events lost to lagging
fn drain(collector_id: &str, rx: &mut broadcast::Receiver<ActivityEvent>) -> (Vec<ActivityEvent>, u64) {
    let mut events = vec![];
    let mut lagged = 0;

    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(missed)) => {
                warn!("{collector_id} missed {missed} activity event(s)");
                lagged += missed;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }

    (events, lagged)
}

/// Counts activity events per tick
pub struct ActivityCollector {
    id: String,
    rx: broadcast::Receiver<ActivityEvent>,
}

impl ActivityCollector {
    pub fn new(id: impl Into<String>, feed: &ActivityFeed) -> Self {
        Self {
            id: id.into(),
            rx: feed.subscribe(),
        }
    }
}

#[async_trait]
impl Collector for ActivityCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        let (events, lagged) = drain(&self.id, &mut self.rx);

        let users: HashSet<&str> = events.iter().map(|e| e.user_id.as_str()).collect();
        let mut per_type: BTreeMap<&str, u64> = BTreeMap::new();
        for event in &events {
            *per_type.entry(event.activity_type.as_str()).or_default() += 1;
        }

        let mut values = MetricValues::new();
        values.insert("activity_events".to_string(), (events.len() as u64 + lagged) as f64);
        values.insert("active_users".to_string(), users.len() as f64);
        for (activity_type, count) in per_type {
            values.insert(format!("activity:{activity_type}"), count as f64);
        }
        Ok(values)
    }
}

/// Counts security-relevant activity types per tick
pub struct SecurityCollector {
    id: String,
    event_types: BTreeSet<String>,
    rx: broadcast::Receiver<ActivityEvent>,
}

impl SecurityCollector {
    pub fn new(id: impl Into<String>, event_types: Vec<String>, feed: &ActivityFeed) -> Self {
        Self {
            id: id.into(),
            event_types: event_types.into_iter().collect(),
            rx: feed.subscribe(),
        }
    }
}

#[async_trait]
impl Collector for SecurityCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        let (events, lagged) = drain(&self.id, &mut self.rx);

        let mut values: MetricValues = self
            .event_types
            .iter()
            .map(|event_type| (event_type.clone(), 0.0))
            .collect();

        let mut total = 0.0;
        for event in events {
            if let Some(count) = values.get_mut(&event.activity_type) {
                *count += 1.0;
                total += 1.0;
            }
        }
        // lost events have no known type, so they only count toward the total
        values.insert("security_events".to_string(), total + lagged as f64);
        Ok(values)
    }
}
