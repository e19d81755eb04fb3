use axum::{
    Json,
    extract::{Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    routes::range,
    state::ApiState,
    types::{AlertsQuery, AlertsResponse, DEFAULT_RANGE_MS},
};
use crate::model::AlertLevel;

/// GET /api/v1/alerts?level=&rangeMs=
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<AlertsResponse>> {
    let level = query
        .level
        .as_deref()
        .map(str::parse::<AlertLevel>)
        .transpose()
        .map_err(ApiError::InvalidRequest)?;
    let (range_ms, since) = range(query.range_ms, DEFAULT_RANGE_MS)?;

    let alerts = state.monitor.alerts(level, since).await?;

    Ok(Json(AlertsResponse {
        range_ms,
        count: alerts.len(),
        alerts,
    }))
}
