//! HTTP route handlers

pub mod activity;
pub mod alerts;
pub mod connections;
pub mod health;
pub mod metrics;
pub mod status;

use chrono::Duration;

use crate::api::error::{ApiError, ApiResult};
use crate::config::MAX_SPAN_MS;

/// Convert a `rangeMs`/`windowMs` query value into a duration
pub(crate) fn range(value: Option<u64>, default_ms: u64) -> ApiResult<(u64, Duration)> {
    let millis = value.unwrap_or(default_ms);
    if millis > MAX_SPAN_MS {
        return Err(ApiError::InvalidRequest(format!(
            "range {millis}ms exceeds the maximum of {MAX_SPAN_MS}ms"
        )));
    }
    // bounded by MAX_SPAN_MS, well inside i64
    Ok((millis, Duration::milliseconds(millis as i64)))
}
