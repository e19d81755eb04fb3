//! Query surface and push channel
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/status` - System status snapshot
//! - `GET /api/v1/metrics?monitor=&rangeMs=` - Samples in a range
//! - `GET /api/v1/metrics/{monitor}/aggregate?windowMs=` - Per-metric aggregates
//! - `GET /api/v1/alerts?level=&rangeMs=` - Recent alerts
//! - `GET /api/v1/connections` - Live push-channel connections
//! - `POST /api/v1/activity` - Publish activity events
//! - `WS /api/v1/stream` - Push channel

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;
#[cfg(feature = "api")]
pub mod websocket;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;

use std::net::SocketAddr;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Optional bearer token; `None` disables authentication
    pub auth_token: Option<String>,

    /// Permissive CORS for browser dashboards
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig::from(&ApiSettings::default())
    }
}

impl From<&ApiSettings> for ApiConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind,
            auth_token: settings.auth_token.clone().filter(|token| !token.is_empty()),
            enable_cors: settings.cors,
        }
    }
}

/// A running API server
#[cfg(feature = "api")]
#[derive(Debug)]
pub struct ApiServer {
    pub local_addr: SocketAddr,
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

#[cfg(feature = "api")]
impl ApiServer {
    /// Stop accepting connections and wait for in-flight requests
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("API server task failed: {e}");
        }
    }
}

/// Build the router with every route and layer
#[cfg(feature = "api")]
pub fn router(state: ApiState, config: &ApiConfig) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = axum::Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/metrics", get(routes::metrics::get_metrics))
        .route(
            "/api/v1/metrics/:monitor/aggregate",
            get(routes::metrics::get_aggregate),
        )
        .route("/api/v1/alerts", get(routes::alerts::get_alerts))
        .route(
            "/api/v1/connections",
            get(routes::connections::list_connections),
        )
        .route("/api/v1/activity", post(routes::activity::post_activity))
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// Binding errors are returned to the caller; once bound, the server runs in
/// a background task until [`ApiServer::shutdown`].
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<ApiServer> {
    use anyhow::Context;
    use tracing::info;

    info!("starting API server on {}", config.bind_addr);

    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let local_addr = listener.local_addr()?;

    info!("API server listening on {local_addr}");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let server = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });

        if let Err(e) = server.await {
            tracing::error!("API server error: {e}");
        }
    });

    Ok(ApiServer {
        local_addr,
        shutdown_tx,
        task,
    })
}
