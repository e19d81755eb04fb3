//! Error types for the monitoring core

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for monitoring core operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors surfaced by the monitoring core
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A sample arrived with a timestamp older than the newest sample of its series
    #[error("sample for `{collector_id}` at {timestamp} is older than the newest stored sample ({newest})")]
    OutOfOrderSample {
        collector_id: String,
        timestamp: DateTime<Utc>,
        newest: DateTime<Utc>,
    },

    /// The monitor actor has stopped and no longer accepts commands
    #[error("monitor actor is not running")]
    ActorUnavailable,
}
