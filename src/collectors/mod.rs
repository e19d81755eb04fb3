//! Data collectors
//!
//! A collector produces one set of metric values per polling tick. The
//! collector actor stamps them with the current time and forwards them to the
//! monitor; the core never depends on a concrete collector kind.

pub mod activity;
pub mod connections;
pub mod latency;
pub mod resource;

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::config::CollectorConfig;
use crate::model::MetricValues;
use crate::push::SubscriptionRegistry;

pub use activity::{ActivityCollector, ActivityFeed, SecurityCollector};
pub use connections::ConnectionsCollector;
pub use latency::LatencyCollector;
pub use resource::ResourceCollector;

#[async_trait]
pub trait Collector: Send {
    /// Collector id, used as the series key
    fn id(&self) -> &str;

    /// Produce the values for one tick
    ///
    /// Errors skip the tick for this collector only.
    async fn collect(&mut self) -> anyhow::Result<MetricValues>;
}

/// Instantiate every configured collector
pub fn build_collectors(
    configs: &[CollectorConfig],
    probe_timeout: Duration,
    feed: &ActivityFeed,
    registry: &SubscriptionRegistry,
) -> anyhow::Result<Vec<Box<dyn Collector>>> {
    configs
        .iter()
        .map(|config| -> anyhow::Result<Box<dyn Collector>> {
            let collector: Box<dyn Collector> = match config {
                CollectorConfig::Resource { id } => Box::new(ResourceCollector::new(id)),
                CollectorConfig::ApiLatency {
                    id,
                    url,
                    expect_body,
                } => Box::new(
                    LatencyCollector::new(id, url, expect_body.as_deref(), probe_timeout)
                        .with_context(|| format!("invalid api_latency collector `{id}`"))?,
                ),
                CollectorConfig::Activity { id } => Box::new(ActivityCollector::new(id, feed)),
                CollectorConfig::Security { id, event_types } => {
                    Box::new(SecurityCollector::new(id, event_types.clone(), feed))
                }
                CollectorConfig::Connections { id } => {
                    Box::new(ConnectionsCollector::new(id, registry.clone()))
                }
            };
            Ok(collector)
        })
        .collect()
}
