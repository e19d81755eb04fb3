use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::ConnectionsResponse};

/// GET /api/v1/connections
pub async fn list_connections(State(state): State<ApiState>) -> Json<ConnectionsResponse> {
    let connections = state.registry.snapshot().await;

    Json(ConnectionsResponse {
        count: connections.len(),
        connections,
    })
}
