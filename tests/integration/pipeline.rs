//! End-to-end flow: collector → monitor → alert → subscribers

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use pretty_assertions::assert_eq;
use telemetry_hub::{
    actors::CollectorHandle,
    model::AlertLevel,
};

use crate::helpers::*;

#[tokio::test]
async fn test_critical_sample_reaches_alert_subscribers() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (_, mut alerts) = subscriber(&hub.registry, &["alerts"]).await;
    let (_, mut metrics_only) = subscriber(&hub.registry, &["metrics"]).await;

    let raised = hub
        .monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 92.0))
        .await
        .unwrap();

    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].level, AlertLevel::Critical);
    assert!(raised[0].out_of_band);

    // broadcast happened before ingest returned
    let frame = next_frame(&mut alerts).await;
    assert_eq!(frame["type"], "ALERT");
    assert_eq!(frame["data"]["level"], "CRITICAL");
    assert_eq!(frame["data"]["monitor"], "resource");
    assert_eq!(frame["data"]["metric"], "cpu_usage");
    assert_eq!(frame["data"]["value"], 92.0);
    assert_eq!(frame["data"]["anomaly"], false);
    assert_no_frame(&mut alerts).await;

    assert_eq!(next_frame(&mut metrics_only).await["type"], "METRICS");
    assert_no_frame(&mut metrics_only).await;

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_level_topic_only_receives_its_level() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (_, mut warnings) = subscriber(&hub.registry, &["alerts:warning"]).await;

    hub.monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 92.0))
        .await
        .unwrap();
    assert_no_frame(&mut warnings).await;

    hub.clock.advance(Duration::seconds(1));
    hub.monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 75.0))
        .await
        .unwrap();
    let frame = next_frame(&mut warnings).await;
    assert_eq!(frame["data"]["level"], "WARNING");

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cooldown_suppresses_repeated_alerts() {
    let hub = spawn_hub(&cpu_threshold_config(5_000), 0);
    let mut fired = vec![];

    for (at, value) in [(0, 85.0), (1_000, 90.0), (2_000, 95.0), (6_000, 95.0)] {
        hub.clock.set_millis(at);
        let alerts = hub
            .monitor
            .ingest(sample(&hub.clock, "resource", "cpu_usage", value))
            .await
            .unwrap();
        fired.extend(alerts.into_iter().map(|alert| alert.timestamp.timestamp_millis()));
    }

    assert_eq!(fired, vec![0, 6_000]);

    let status = hub.monitor.system_status().await.unwrap();
    assert_eq!(status.suppressed_alerts, 2);
    assert_eq!(status.alerts.total, 2);

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_keeps_cooldown_longer_than_retention() {
    let config = telemetry_hub::config::Config {
        metrics_retention_ms: 60_000,
        ..cpu_threshold_config(300_000)
    };
    let hub = spawn_hub(&config, 0);

    let first = hub
        .monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 95.0))
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    hub.clock.set_millis(61_000);
    hub.monitor.sweep().await.unwrap();

    hub.clock.set_millis(62_000);
    let second = hub
        .monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 95.0))
        .await
        .unwrap();
    assert!(second.is_empty());

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_anomaly_pass_flags_outlier() {
    let hub = spawn_hub(&Default::default(), 0);
    let (_, mut alerts) = subscriber(&hub.registry, &["alerts"]).await;

    let mut values = vec![];
    values.extend(std::iter::repeat_n(48.0, 9));
    values.extend(std::iter::repeat_n(52.0, 9));
    values.extend([50.0, 70.0]);
    for (i, value) in values.into_iter().enumerate() {
        hub.clock.set_millis(i as i64 * 1_000);
        hub.monitor
            .ingest(sample(&hub.clock, "checkout", "latency", value))
            .await
            .unwrap();
    }

    let flagged = hub.monitor.detect_anomalies().await.unwrap();
    assert_eq!(flagged.len(), 1);
    assert!(flagged[0].anomaly);
    assert_eq!(flagged[0].value, 70.0);
    assert_eq!(flagged[0].level, AlertLevel::Critical);

    let frame = next_frame(&mut alerts).await;
    assert_eq!(frame["data"]["anomaly"], true);

    // a second pass over the same window finds the same sample: deduplicated
    assert!(hub.monitor.detect_anomalies().await.unwrap().is_empty());

    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_collector_actor_feeds_monitor() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (_, mut frames) = subscriber(&hub.registry, &["metrics:resource", "alerts"]).await;

    let collector = CollectorHandle::spawn(
        Box::new(ScriptedCollector {
            id: "resource".to_string(),
            metric: "cpu_usage".to_string(),
            values: vec![40.0, 99.0],
        }),
        Arc::new(hub.clock.clone()),
        hub.monitor.event_sender(),
        StdDuration::from_secs(3600),
        StdDuration::from_secs(1),
    );

    // first tick fires immediately
    let frame = next_frame(&mut frames).await;
    assert_eq!(frame["type"], "METRICS");
    assert_eq!(frame["data"]["cpu_usage"], 40.0);

    hub.clock.advance(Duration::seconds(1));
    collector.poll_now().await.unwrap();
    assert_eq!(next_frame(&mut frames).await["type"], "METRICS");
    assert_eq!(next_frame(&mut frames).await["type"], "ALERT");

    let samples = hub
        .monitor
        .metrics(Some("resource".to_string()), Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(samples.len(), 2);

    collector.shutdown().await.unwrap();
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_sweep_applies_retention() {
    let config = telemetry_hub::config::Config {
        metrics_retention_ms: 10_000,
        ..cpu_threshold_config(0)
    };
    let hub = spawn_hub(&config, 0);

    for at in [0, 5_000, 10_000] {
        hub.clock.set_millis(at);
        hub.monitor
            .ingest(sample(&hub.clock, "resource", "cpu_usage", 90.0))
            .await
            .unwrap();
    }

    hub.clock.set_millis(15_000);
    let report = hub.monitor.sweep().await.unwrap();
    assert_eq!(report.samples, 1);
    assert_eq!(report.alerts, 1);

    let remaining = hub
        .monitor
        .metrics(None, Duration::days(1))
        .await
        .unwrap();
    let timestamps: Vec<i64> = remaining
        .iter()
        .map(|sample| sample.timestamp.timestamp_millis())
        .collect();
    assert_eq!(timestamps, vec![5_000, 10_000]);

    hub.monitor.shutdown().await.unwrap();
}
