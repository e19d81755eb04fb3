//! Metric queries

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::ApiResult,
    routes::range,
    state::ApiState,
    types::{AggregateQuery, AggregateResponse, DEFAULT_RANGE_MS, MetricsQuery, MetricsResponse},
};

/// GET /api/v1/metrics?monitor=&rangeMs=
///
/// Samples of one collector, or of all collectors merged by timestamp
pub async fn get_metrics(
    State(state): State<ApiState>,
    Query(query): Query<MetricsQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    let (range_ms, since) = range(query.range_ms, DEFAULT_RANGE_MS)?;
    let samples = state.monitor.metrics(query.monitor.clone(), since).await?;

    Ok(Json(MetricsResponse {
        monitor: query.monitor,
        range_ms,
        count: samples.len(),
        samples,
    }))
}

/// GET /api/v1/metrics/{monitor}/aggregate?windowMs=
pub async fn get_aggregate(
    State(state): State<ApiState>,
    Path(monitor): Path<String>,
    Query(query): Query<AggregateQuery>,
) -> ApiResult<Json<AggregateResponse>> {
    let (window_ms, window) = range(query.window_ms, DEFAULT_RANGE_MS)?;
    let metrics = state.monitor.aggregate(monitor.clone(), window).await?;

    Ok(Json(AggregateResponse {
        monitor,
        window_ms,
        metrics,
    }))
}
