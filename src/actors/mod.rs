//! Actor-based periodic drivers
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐        ┌──────────────┐
//!   │ Collector-1  │   │ Collector-2  │  ...   │ Collector-N  │
//!   └──────┬───────┘   └──────┬───────┘        └──────┬───────┘
//!          └──────────────────┼───────────────────────┘
//!                             │ CollectorEvent (bounded mpsc)
//!                    ┌────────▼────────┐
//!                    │  MonitorActor   │ owns MonitorCore
//!                    └────────┬────────┘
//!                             │ broadcast
//!                  ┌──────────▼───────────┐
//!                  │ SubscriptionRegistry │ → push-channel subscribers
//!                  └──────────────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control messages
//! 2. **Events**: collectors submit samples through one queue to the single writer
//! 3. **Request/Response**: oneshot channels for queries

pub mod collector;
pub mod messages;
pub mod monitor;

pub use collector::CollectorHandle;
pub use monitor::MonitorHandle;
