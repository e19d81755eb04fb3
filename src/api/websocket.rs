//! WebSocket transport for the push channel
//!
//! Each socket gets a bounded [`ChannelSink`] registered with the
//! [`SubscriptionRegistry`](crate::push::SubscriptionRegistry). A writer task
//! drains the sink into the socket; the reader task feeds inbound frames to
//! the registry. Whichever side finishes first ends the connection.

use std::net::SocketAddr;

use axum::{
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::debug;

use crate::api::state::ApiState;
use crate::push::{ChannelSink, registry::DEFAULT_SINK_CAPACITY};

/// WebSocket upgrade handler
///
/// GET /api/v1/stream
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<ApiState>,
) -> Response {
    let remote_addr = connect_info.map(|ConnectInfo(addr)| addr);
    ws.on_upgrade(move |socket| handle_websocket(socket, remote_addr, state))
}

async fn handle_websocket(socket: WebSocket, remote_addr: Option<SocketAddr>, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    let (sink, mut frames) = ChannelSink::new(DEFAULT_SINK_CAPACITY);
    let id = state.registry.connect(remote_addr, sink).await;
    debug!(connection = %id, ?remote_addr, "push client connected");

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
        let _ = sender.close().await;
    });

    // the welcome frame is queued once the writer is draining
    state.registry.open(id).await;

    let registry = state.registry.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if registry.handle_inbound(id, &text).await.is_none() {
                        // connection already dropped by a failed broadcast
                        break;
                    }
                }
                Message::Close(_) => {
                    debug!("client sent close frame");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Some(info) = state.registry.disconnect(id).await {
        debug!(
            connection = %id,
            subscriptions = info.subscriptions.len(),
            "push client disconnected"
        );
    }
}
