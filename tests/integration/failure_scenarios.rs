//! Failure handling across the actor system
//!
//! - Collector failures are counted and never stop the monitor
//! - A stalled subscriber is dropped without affecting the others
//! - Webhook failures leave the alert undeliverable
//! - Handles fail cleanly after shutdown

use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::Duration;
use telemetry_hub::{
    actors::{CollectorHandle, MonitorHandle},
    core::router::DeliveryStatus,
    error::MonitorError,
    notify::{AlertNotifier, WebhookNotifier},
    push::ChannelSink,
};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn wait_for_delivery(monitor: &MonitorHandle, id: Uuid) -> DeliveryStatus {
    for _ in 0..100 {
        let records = monitor.alerts(None, Duration::days(1)).await.unwrap();
        if let Some(record) = records.iter().find(|record| record.alert.id == id)
            && record.delivery != DeliveryStatus::Pending
        {
            return record.delivery;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    DeliveryStatus::Pending
}

#[tokio::test]
async fn test_collector_failures_are_counted() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);

    let collector = CollectorHandle::spawn(
        Box::new(ScriptedCollector {
            id: "flaky".to_string(),
            metric: "cpu_usage".to_string(),
            values: vec![],
        }),
        Arc::new(hub.clock.clone()),
        hub.monitor.event_sender(),
        StdDuration::from_secs(3600),
        StdDuration::from_secs(1),
    );

    assert!(collector.poll_now().await.is_err());

    // the immediate tick and the manual poll both failed
    let mut errors = 0;
    for _ in 0..50 {
        let status = hub.monitor.system_status().await.unwrap();
        errors = status.collectors.get("flaky").map_or(0, |stats| stats.errors);
        if errors >= 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(errors, 2);

    // the monitor keeps working
    let alerts = hub
        .monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 90.0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);

    collector.shutdown().await.unwrap();
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stalled_subscriber_is_dropped() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (_, mut healthy) = subscriber(&hub.registry, &["alerts"]).await;

    // capacity 1: the welcome frame fills the queue and nobody drains it
    let (sink, _stalled_rx) = ChannelSink::new(1);
    let stalled = hub.registry.connect(None, sink).await;
    assert!(hub.registry.open(stalled).await);
    hub.registry
        .handle_inbound(stalled, r#"{"type":"SUBSCRIBE","channels":["alerts"]}"#)
        .await;
    assert_eq!(hub.registry.connection_count().await, 2);

    for value in [90.0, 91.0, 92.0] {
        hub.clock.advance(Duration::seconds(1));
        hub.monitor
            .ingest(sample(&hub.clock, "resource", "cpu_usage", value))
            .await
            .unwrap();
    }

    for value in [90.0, 91.0, 92.0] {
        let frame = next_frame(&mut healthy).await;
        assert_eq!(frame["data"]["value"], value);
    }
    assert_eq!(hub.registry.connection_count().await, 1);
    assert!(hub.registry.get(stalled).await.is_none());

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_webhook_failure_marks_alert_undeliverable() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier: Arc<dyn AlertNotifier> = Arc::new(
        WebhookNotifier::new(
            format!("{}/hook", mock_server.uri()),
            StdDuration::from_secs(2),
        )
        .unwrap(),
    );

    let hub = spawn_hub_with_notifier(&cpu_threshold_config(0), 60_000, Some(notifier));
    let monitor = &hub.monitor;

    let alerts = monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 95.0))
        .await
        .unwrap();
    assert_eq!(alerts.len(), 1);

    assert_eq!(
        wait_for_delivery(monitor, alerts[0].id).await,
        DeliveryStatus::Undeliverable
    );

    let status = monitor.system_status().await.unwrap();
    assert_eq!(status.alerts.undeliverable, 1);

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_webhook_delivery_succeeds() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier: Arc<dyn AlertNotifier> = Arc::new(
        WebhookNotifier::new(
            format!("{}/hook", mock_server.uri()),
            StdDuration::from_secs(2),
        )
        .unwrap(),
    );

    let hub = spawn_hub_with_notifier(&cpu_threshold_config(0), 60_000, Some(notifier));
    let monitor = &hub.monitor;

    // WARNING stays in-band
    let warning = monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 75.0))
        .await
        .unwrap();
    assert!(!warning[0].out_of_band);

    hub.clock.advance(Duration::seconds(1));
    let critical = monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 95.0))
        .await
        .unwrap();

    assert_eq!(
        wait_for_delivery(monitor, critical[0].id).await,
        DeliveryStatus::Delivered
    );
    assert_eq!(
        wait_for_delivery(monitor, warning[0].id).await,
        DeliveryStatus::NotRequired
    );

    monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_out_of_order_sample_is_rejected() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);

    hub.monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 10.0))
        .await
        .unwrap();

    hub.clock.set_millis(30_000);
    let result = hub
        .monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 99.0))
        .await;
    assert_matches!(result, Err(MonitorError::OutOfOrderSample { .. }));

    let status = hub.monitor.system_status().await.unwrap();
    assert_eq!(status.collectors["resource"].rejected, 1);
    assert_eq!(status.samples, 1);

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_handles_fail_after_monitor_shutdown() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let collector = CollectorHandle::spawn(
        Box::new(ScriptedCollector {
            id: "resource".to_string(),
            metric: "cpu_usage".to_string(),
            values: vec![10.0; 64],
        }),
        Arc::new(hub.clock.clone()),
        hub.monitor.event_sender(),
        StdDuration::from_secs(3600),
        StdDuration::from_secs(1),
    );

    hub.monitor.shutdown().await.unwrap();

    assert_matches!(
        hub.monitor.system_status().await,
        Err(MonitorError::ActorUnavailable)
    );

    // the collector notices the closed queue on its next poll and stops
    let mut stopped = false;
    for _ in 0..50 {
        if collector.poll_now().await.is_err() {
            stopped = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(stopped);
}
