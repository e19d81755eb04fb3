//! Query surface over HTTP
//!
//! - Every endpoint answers with the documented JSON shape
//! - Query parameters are validated
//! - Authentication middleware guards everything except health

use chrono::Duration;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Value, json};
use telemetry_hub::collectors::{ActivityCollector, Collector};

use crate::helpers::*;

async fn get_json(url: String) -> (StatusCode, Value) {
    let response = reqwest::get(url).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap_or(Value::Null))
}

/// Hub with three cpu samples (40, 75, 92) one second apart
async fn populated_hub() -> TestHub {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    for value in [40.0, 75.0, 92.0] {
        hub.monitor
            .ingest(sample(&hub.clock, "resource", "cpu_usage", value))
            .await
            .unwrap();
        hub.clock.advance(Duration::seconds(1));
    }
    hub
}

#[tokio::test]
async fn test_health() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (server, _) = spawn_api(&hub, None).await;

    let (status, body) = get_json(format!("http://{}/api/v1/health", server.local_addr)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_status() {
    let hub = populated_hub().await;
    let (server, _) = spawn_api(&hub, None).await;

    let (status, body) = get_json(format!("http://{}/api/v1/status", server.local_addr)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["samples"], 3);
    assert_eq!(body["series"], 1);
    assert_eq!(body["thresholds"], 1);
    assert_eq!(body["alerts"]["warning"], 1);
    assert_eq!(body["alerts"]["critical"], 1);
    assert_eq!(body["collectors"]["resource"]["samples"], 3);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_queries() {
    let hub = populated_hub().await;
    hub.monitor
        .ingest(sample(&hub.clock, "checkout", "latency", 120.0))
        .await
        .unwrap();
    let (server, _) = spawn_api(&hub, None).await;
    let base = format!("http://{}/api/v1", server.local_addr);

    let (status, body) = get_json(format!("{base}/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(body["rangeMs"], 3_600_000);

    let (_, body) = get_json(format!("{base}/metrics?monitor=resource")).await;
    assert_eq!(body["monitor"], "resource");
    assert_eq!(body["count"], 3);
    assert_eq!(body["samples"][0]["values"]["cpu_usage"], 40.0);

    // now is 63s; a 1.5s range covers the samples at 62s and 63s
    let (_, body) = get_json(format!("{base}/metrics?rangeMs=1500")).await;
    let monitors: Vec<&str> = body["samples"]
        .as_array()
        .unwrap()
        .iter()
        .map(|sample| sample["collectorId"].as_str().unwrap())
        .collect();
    assert_eq!(monitors, vec!["resource", "checkout"]);

    let (_, body) = get_json(format!("{base}/metrics?monitor=nope")).await;
    assert_eq!(body["count"], 0);

    let (status, _) = get_json(format!("{base}/metrics?rangeMs=-5")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for url in [
        format!("{base}/metrics?rangeMs=9223372036854775807"),
        format!("{base}/alerts?rangeMs=9223372036854775807"),
        format!("{base}/metrics/resource/aggregate?windowMs=9223372036854775807"),
    ] {
        let (status, _) = get_json(url).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    // the monitor is still serving
    let (status, _) = get_json(format!("{base}/status")).await;
    assert_eq!(status, StatusCode::OK);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_aggregate() {
    let hub = populated_hub().await;
    let (server, _) = spawn_api(&hub, None).await;

    let (status, body) = get_json(format!(
        "http://{}/api/v1/metrics/resource/aggregate?windowMs=60000",
        server.local_addr
    ))
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["monitor"], "resource");

    let cpu = &body["metrics"]["cpu_usage"];
    assert_eq!(cpu["count"], 3);
    assert_eq!(cpu["min"], 40.0);
    assert_eq!(cpu["max"], 92.0);
    assert_eq!(cpu["lastValue"], 92.0);
    assert_eq!(cpu["trendSign"], 1);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alerts_filtered_by_level() {
    let hub = populated_hub().await;
    let (server, _) = spawn_api(&hub, None).await;
    let base = format!("http://{}/api/v1", server.local_addr);

    let (status, body) = get_json(format!("{base}/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (_, body) = get_json(format!("{base}/alerts?level=critical")).await;
    assert_eq!(body["count"], 1);
    let alert = &body["alerts"][0];
    assert_eq!(alert["level"], "CRITICAL");
    assert_eq!(alert["value"], 92.0);
    assert_eq!(alert["delivery"], "undeliverable");
    assert_eq!(alert["thresholdOrReason"]["kind"], "threshold");

    let (status, body) = get_json(format!("{base}/alerts?level=panic")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("panic"));

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_activity_is_published_to_feed() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (server, feed) = spawn_api(&hub, None).await;
    let mut collector = ActivityCollector::new("activity", &feed);
    let client = reqwest::Client::new();
    let url = format!("http://{}/api/v1/activity", server.local_addr);

    let response = client
        .post(&url)
        .json(&json!([
            { "userId": "u1", "activityType": "login" },
            { "userId": "u2", "activityType": "login" },
            { "userId": "u1", "activityType": "booking" },
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accepted"], 3);

    let values = collector.collect().await.unwrap();
    assert_eq!(values["activity_events"], 3.0);
    assert_eq!(values["active_users"], 2.0);
    assert_eq!(values["activity:login"], 2.0);

    let response = client
        .post(&url)
        .json(&json!({ "userId": "", "activityType": "login" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connections_snapshot() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (_id, _frames) = subscriber(&hub.registry, &["alerts", "system"]).await;
    let (server, _) = spawn_api(&hub, None).await;

    let (status, body) = get_json(format!("http://{}/api/v1/connections", server.local_addr)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["connections"][0]["state"], "OPEN");
    assert_eq!(body["connections"][0]["subscriptions"], json!(["alerts", "system"]));

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_auth_middleware() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (server, _) = spawn_api(&hub, Some("s3cret")).await;
    let base = format!("http://{}/api/v1", server.local_addr);
    let client = reqwest::Client::new();

    // health stays open
    let response = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(format!("{base}/status")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{base}/status"))
        .header("Authorization", "Token s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .get(format!("{base}/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .get(format!("{base}/status"))
        .bearer_auth("s3cret")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_encoded_query_token() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (server, _) = spawn_api(&hub, Some("s3c+r=t/")).await;
    let client = reqwest::Client::new();

    // reqwest percent-encodes the reserved characters
    let response = client
        .get(format!("http://{}/api/v1/status", server.local_addr))
        .query(&[("access_token", "s3c+r=t/")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unavailable_after_monitor_shutdown() {
    let hub = spawn_hub(&Default::default(), 60_000);
    let (server, _) = spawn_api(&hub, None).await;
    hub.monitor.shutdown().await.unwrap();

    let (status, body) = get_json(format!("http://{}/api/v1/status", server.local_addr)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    server.shutdown().await;
}
