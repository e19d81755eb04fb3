//! Push-channel fan-out to live subscribers

pub mod protocol;
pub mod registry;

pub use protocol::{InboundMessage, OutboundMessage};
pub use registry::{ChannelSink, ConnectionId, ConnectionSink, SinkError, SubscriptionRegistry};
