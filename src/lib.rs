//! Telemetry hub: periodic collectors, threshold and anomaly alerting, and
//! fan-out to push-channel subscribers.

pub mod actors;
pub mod api;
pub mod clock;
pub mod collectors;
pub mod config;
pub mod core;
pub mod error;
pub mod model;
pub mod notify;
pub mod push;
pub mod util;
