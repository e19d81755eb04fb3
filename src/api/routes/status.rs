use axum::{Json, extract::State};

use crate::api::{error::ApiResult, state::ApiState};
use crate::core::SystemStatus;

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> ApiResult<Json<SystemStatus>> {
    let status = state.monitor.system_status().await?;
    Ok(Json(status))
}
