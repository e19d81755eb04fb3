//! API shared state containing actor handles

use std::sync::Arc;

use crate::actors::MonitorHandle;
use crate::clock::Clock;
use crate::collectors::ActivityFeed;
use crate::push::SubscriptionRegistry;

/// Shared state passed to all API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    /// Monitor actor, for every query against the core
    pub monitor: MonitorHandle,

    /// Live push-channel connections
    pub registry: SubscriptionRegistry,

    /// Inbound business activity
    pub feed: ActivityFeed,

    pub clock: Arc<dyn Clock>,
}

impl ApiState {
    pub fn new(
        monitor: MonitorHandle,
        registry: SubscriptionRegistry,
        feed: ActivityFeed,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            monitor,
            registry,
            feed,
            clock,
        }
    }
}
