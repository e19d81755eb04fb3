//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use telemetry_hub::{
    actors::MonitorHandle,
    clock::{Clock, ManualClock},
    collectors::Collector,
    config::{Config, ThresholdConfig},
    model::{MetricValues, SampleSet},
    notify::AlertNotifier,
    push::{ChannelSink, ConnectionId, SubscriptionRegistry},
};
use tokio::sync::mpsc;

/// Thresholds `{warning 70, critical 85}` on `resource.cpu_usage`
pub fn cpu_threshold_config(cooldown_ms: u64) -> Config {
    Config {
        alert_cooldown_ms: cooldown_ms,
        thresholds: vec![ThresholdConfig {
            collector: "resource".to_string(),
            metric: "cpu_usage".to_string(),
            warning: Some(70.0),
            critical: Some(85.0),
            low: None,
        }],
        ..Config::default()
    }
}

pub struct TestHub {
    pub clock: ManualClock,
    pub registry: SubscriptionRegistry,
    pub monitor: MonitorHandle,
}

pub fn spawn_hub(config: &Config, start_millis: i64) -> TestHub {
    spawn_hub_with_notifier(config, start_millis, None)
}

pub fn spawn_hub_with_notifier(
    config: &Config,
    start_millis: i64,
    notifier: Option<Arc<dyn AlertNotifier>>,
) -> TestHub {
    let clock = ManualClock::at_millis(start_millis);
    let registry = SubscriptionRegistry::new(Arc::new(clock.clone()));
    let monitor = MonitorHandle::spawn(config, Arc::new(clock.clone()), registry.clone(), notifier);

    TestHub {
        clock,
        registry,
        monitor,
    }
}

pub fn sample(clock: &ManualClock, collector_id: &str, metric: &str, value: f64) -> SampleSet {
    SampleSet::new(
        collector_id,
        clock.now(),
        MetricValues::from([(metric.to_string(), value)]),
    )
}

/// Register an open connection subscribed to `channels`; the welcome frame is
/// already consumed
pub async fn subscriber(
    registry: &SubscriptionRegistry,
    channels: &[&str],
) -> (ConnectionId, mpsc::Receiver<String>) {
    let (sink, mut frames) = ChannelSink::new(64);
    let id = registry.connect(None, sink).await;
    assert!(registry.open(id).await);
    let welcome = next_frame(&mut frames).await;
    assert_eq!(welcome["type"], "WELCOME");

    let subscribe = serde_json::json!({ "type": "SUBSCRIBE", "channels": channels });
    registry.handle_inbound(id, &subscribe.to_string()).await;

    (id, frames)
}

pub async fn next_frame(frames: &mut mpsc::Receiver<String>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("sink closed");
    serde_json::from_str(&frame).unwrap()
}

pub async fn assert_no_frame(frames: &mut mpsc::Receiver<String>) {
    let result = tokio::time::timeout(Duration::from_millis(100), frames.recv()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

/// Replays a fixed list of values, one per collection
pub struct ScriptedCollector {
    pub id: String,
    pub metric: String,
    pub values: Vec<f64>,
}

#[async_trait]
impl Collector for ScriptedCollector {
    fn id(&self) -> &str {
        &self.id
    }

    async fn collect(&mut self) -> anyhow::Result<MetricValues> {
        if self.values.is_empty() {
            anyhow::bail!("script exhausted");
        }
        let value = self.values.remove(0);
        Ok(MetricValues::from([(self.metric.clone(), value)]))
    }
}

/// Serve the query surface and push channel for `hub` on an ephemeral port
#[cfg(feature = "api")]
pub async fn spawn_api(
    hub: &TestHub,
    auth_token: Option<&str>,
) -> (telemetry_hub::api::ApiServer, telemetry_hub::collectors::ActivityFeed) {
    use telemetry_hub::api::{ApiConfig, ApiState, spawn_api_server};
    use telemetry_hub::collectors::ActivityFeed;

    let feed = ActivityFeed::default();
    let state = ApiState::new(
        hub.monitor.clone(),
        hub.registry.clone(),
        feed.clone(),
        Arc::new(hub.clock.clone()),
    );
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        auth_token: auth_token.map(str::to_string),
        enable_cors: true,
    };

    let server = spawn_api_server(config, state).await.unwrap();
    (server, feed)
}
