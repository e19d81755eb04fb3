//! Live push-channel connections and their topic subscriptions
//!
//! The registry is shared between the transport tasks (connect, inbound
//! messages, disconnect) and the monitor actor (broadcasts). Writes go through
//! a [`ConnectionSink`], which must never block: a sink that cannot take a
//! frame reports an error and the connection is dropped.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::clock::Clock;
use crate::push::protocol::{InboundMessage, OutboundMessage};

pub type ConnectionId = Uuid;

/// Frames buffered per connection before it counts as stalled
pub const DEFAULT_SINK_CAPACITY: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("connection queue is full")]
    Full,

    #[error("connection is closed")]
    Closed,
}

/// Non-blocking writer for one connection
pub trait ConnectionSink: Debug + Send + Sync {
    fn send(&self, frame: String) -> Result<(), SinkError>;
}

/// Sink backed by a bounded queue, drained by the connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl ConnectionSink for ChannelSink {
    fn send(&self, frame: String) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Observable state of one connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub remote_addr: Option<SocketAddr>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub connected_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
    pub state: ConnectionState,
    pub subscriptions: BTreeSet<String>,
}

#[derive(Debug)]
struct Connection {
    info: ConnectionInfo,
    sink: Box<dyn ConnectionSink>,
}

impl Connection {
    fn is_subscribed_to_any(&self, topics: &[&str]) -> bool {
        topics.iter().any(|topic| self.info.subscriptions.contains(*topic))
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, Connection>>>,
    clock: Arc<dyn Clock>,
}

impl SubscriptionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Register a new connection in the `Connecting` state
    pub async fn connect(&self, remote_addr: Option<SocketAddr>, sink: impl ConnectionSink + 'static) -> ConnectionId {
        let id = Uuid::new_v4();
        let now = self.clock.now();

        let connection = Connection {
            info: ConnectionInfo {
                id,
                remote_addr,
                connected_at: now,
                last_activity_at: now,
                state: ConnectionState::Connecting,
                subscriptions: BTreeSet::new(),
            },
            sink: Box::new(sink),
        };

        self.connections.write().await.insert(id, connection);
        debug!("connection {id} registered from {remote_addr:?}");
        id
    }

    /// Send the welcome frame and move the connection to `Open`
    ///
    /// Returns `false` if the connection is unknown or the welcome write failed
    /// (in which case it has been removed).
    pub async fn open(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let Some(connection) = connections.get_mut(&id) else {
            return false;
        };

        let welcome = OutboundMessage::Welcome {
            connection_id: id,
            timestamp: self.clock.now(),
        };
        if let Err(err) = connection.sink.send(welcome.to_frame()) {
            debug!("welcome to {id} failed: {err}");
            connections.remove(&id);
            return false;
        }

        connection.info.state = ConnectionState::Open;
        info!("connection {id} open");
        true
    }

    /// Apply one inbound text frame
    ///
    /// Unknown or malformed frames are ignored.
    pub async fn handle_inbound(&self, id: ConnectionId, text: &str) -> Option<InboundMessage> {
        let mut connections = self.connections.write().await;
        let connection = connections.get_mut(&id)?;
        let now = self.clock.now();
        connection.info.last_activity_at = now;

        let message = InboundMessage::parse(text);
        match &message {
            InboundMessage::Subscribe { channels } => {
                debug!("connection {id} subscribing to {channels:?}");
                connection.info.subscriptions.extend(channels.iter().cloned());
            }
            InboundMessage::Unsubscribe { channels } => {
                debug!("connection {id} unsubscribing from {channels:?}");
                for channel in channels {
                    connection.info.subscriptions.remove(channel);
                }
            }
            InboundMessage::Ping => {
                let pong = OutboundMessage::Pong { timestamp: now };
                if let Err(err) = connection.sink.send(pong.to_frame()) {
                    debug!("pong to {id} failed: {err}");
                    connections.remove(&id);
                }
            }
            InboundMessage::Unknown => {
                trace!("ignoring unrecognized frame from {id}");
            }
        }

        Some(message)
    }

    /// Remove a connection; returns its final state
    pub async fn disconnect(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        let mut connection = self.connections.write().await.remove(&id)?;
        connection.info.state = ConnectionState::Closed;
        info!("connection {id} closed");
        Some(connection.info)
    }

    /// Write `message` to every open connection subscribed to `topic`
    pub async fn broadcast(&self, topic: &str, message: &OutboundMessage) -> usize {
        self.broadcast_to_any(&[topic], message).await
    }

    /// Write `message` once to every open connection subscribed to at least
    /// one of `topics`
    ///
    /// A failed write removes only the affected connection. Returns the number
    /// of connections the frame was delivered to.
    pub async fn broadcast_to_any(&self, topics: &[&str], message: &OutboundMessage) -> usize {
        let frame = message.to_frame();
        let mut connections = self.connections.write().await;

        let mut delivered = 0;
        let mut failed = vec![];
        for (id, connection) in connections.iter() {
            if connection.info.state != ConnectionState::Open || !connection.is_subscribed_to_any(topics) {
                continue;
            }
            match connection.sink.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    debug!("dropping connection {id}: {err}");
                    failed.push(*id);
                }
            }
        }

        for id in failed {
            connections.remove(&id);
        }

        trace!("broadcast to {topics:?} reached {delivered} connection(s)");
        delivered
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Total number of topic subscriptions across all connections
    pub async fn subscription_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .map(|connection| connection.info.subscriptions.len())
            .sum()
    }

    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections
            .read()
            .await
            .get(&id)
            .map(|connection| connection.info.clone())
    }

    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .read()
            .await
            .values()
            .map(|connection| connection.info.clone())
            .collect();
        infos.sort_by_key(|info| info.connected_at);
        infos
    }
}
