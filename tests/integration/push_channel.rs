//! Push channel over a real WebSocket

use std::time::Duration as StdDuration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::helpers::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(StdDuration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut Client, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// PING/PONG round trip; everything sent before it has been applied
async fn sync(ws: &mut Client) {
    send_json(ws, json!({ "type": "PING" })).await;
    assert_eq!(next_json(ws).await["type"], "PONG");
}

#[tokio::test]
async fn test_welcome_subscribe_and_alert() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (server, _feed) = spawn_api(&hub, None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/api/v1/stream", server.local_addr))
        .await
        .unwrap();

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "WELCOME");
    assert!(welcome["connectionId"].is_string());
    assert_eq!(welcome["timestamp"], 60_000);

    send_json(&mut ws, json!({ "type": "SUBSCRIBE", "channels": ["alerts"] })).await;
    sync(&mut ws).await;

    hub.monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 92.0))
        .await
        .unwrap();

    let alert = next_json(&mut ws).await;
    assert_eq!(alert["type"], "ALERT");
    assert_eq!(alert["data"]["level"], "CRITICAL");
    assert_eq!(alert["data"]["monitor"], "resource");

    ws.close(None).await.unwrap();
    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsubscribe_and_garbage_frames() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (server, _feed) = spawn_api(&hub, None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/api/v1/stream", server.local_addr))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "WELCOME");

    send_json(&mut ws, json!({ "type": "SUBSCRIBE", "channels": ["metrics", "alerts"] })).await;
    ws.send(Message::Text("not json".to_string())).await.unwrap();
    send_json(&mut ws, json!({ "type": "DANCE" })).await;
    send_json(&mut ws, json!({ "type": "UNSUBSCRIBE", "channels": ["alerts"] })).await;
    sync(&mut ws).await;

    hub.monitor
        .ingest(sample(&hub.clock, "resource", "cpu_usage", 92.0))
        .await
        .unwrap();

    assert_eq!(next_json(&mut ws).await["type"], "METRICS");
    sync(&mut ws).await;

    let connections = hub.registry.snapshot().await;
    assert_eq!(connections.len(), 1);
    assert_eq!(
        connections[0].subscriptions.iter().collect::<Vec<_>>(),
        vec!["metrics"]
    );

    ws.close(None).await.unwrap();
    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_closed_socket_is_unregistered() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (server, _feed) = spawn_api(&hub, None).await;

    let (mut ws, _) = connect_async(format!("ws://{}/api/v1/stream", server.local_addr))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "WELCOME");
    assert_eq!(hub.registry.connection_count().await, 1);

    ws.close(None).await.unwrap();

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = hub.registry.connection_count().await;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert_eq!(remaining, 0);

    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stream_requires_token_when_configured() {
    let hub = spawn_hub(&cpu_threshold_config(0), 60_000);
    let (server, _feed) = spawn_api(&hub, Some("s3cret")).await;

    let url = format!("ws://{}/api/v1/stream", server.local_addr);
    assert!(connect_async(url.as_str()).await.is_err());

    let (mut ws, _) = connect_async(format!("{url}?access_token=s3cret"))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "WELCOME");

    ws.close(None).await.unwrap();
    server.shutdown().await;
    hub.monitor.shutdown().await.unwrap();
}
