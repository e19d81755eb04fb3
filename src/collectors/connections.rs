use async_trait::async_trait;

use crate::collectors::Collector;
use crate::model::MetricValues;
use crate::push::SubscriptionRegistry;

/// Live push-channel connection counts
pub struct ConnectionsCollector {
    id: String,
    registry: SubscriptionRegistry,
}

impl ConnectionsCollector {
    pub fn new(id: impl Into<String>, registry: SubscriptionRegistry) -> Self {
        Self {
            id: id.into(),
            registry,
        }
    }
}

#[async_trait]
impl Collector for ConnectionsCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        let mut values = MetricValues::new();
        values.insert(
            "active_connections".to_string(),
            self.registry.connection_count().await as f64,
        );
        values.insert(
            "subscriptions".to_string(),
            self.registry.subscription_count().await as f64,
        );
        Ok(values)
    }
}
