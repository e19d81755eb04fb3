//! Bearer token authentication middleware

use axum::{
    Json,
    body::Body,
    extract::{Query, Request, State},
    http::{StatusCode, Uri, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

/// Path that stays reachable without a token
pub const HEALTH_PATH: &str = "/api/v1/health";

/// Query string accepted in place of the header (browser WebSocket clients)
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Authentication middleware
///
/// Accepts `Authorization: Bearer <token>` or `?access_token=<token>`.
pub async fn auth_middleware(
    State(expected_token): State<String>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if request.uri().path() == HEALTH_PATH {
        return Ok(next.run(request).await);
    }

    let token = match request.headers().get(AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or(AuthError::InvalidFormat)?,
        None => query_token(request.uri()).ok_or(AuthError::MissingToken)?,
    };

    if token != expected_token {
        return Err(AuthError::InvalidToken);
    }

    Ok(next.run(request).await)
}

/// Percent-decoded `access_token` query parameter
fn query_token(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<TokenQuery>::try_from_uri(uri).ok()?;
    query.access_token.filter(|token| !token.is_empty())
}

/// Authentication errors
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidFormat,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing Authorization header"),
            AuthError::InvalidFormat => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization format (expected: Bearer <token>)",
            ),
            AuthError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token"),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
