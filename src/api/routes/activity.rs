use axum::{Json, extract::State, http::StatusCode};
use tracing::debug;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{ActivityRequest, ActivityResponse},
};

/// POST /api/v1/activity
///
/// Publishes one event or a batch on the activity feed
pub async fn post_activity(
    State(state): State<ApiState>,
    Json(request): Json<ActivityRequest>,
) -> ApiResult<(StatusCode, Json<ActivityResponse>)> {
    let events = request.into_events();
    if events.iter().any(|event| event.user_id.is_empty() || event.activity_type.is_empty()) {
        return Err(ApiError::InvalidRequest(
            "userId and activityType must not be empty".to_string(),
        ));
    }

    let accepted = events.len();
    for event in events {
        state.feed.publish(event);
    }
    debug!("accepted {accepted} activity event(s)");

    Ok((StatusCode::ACCEPTED, Json(ActivityResponse { accepted })))
}
