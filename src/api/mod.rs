//! HTTP + WebSocket API: task launch/status/stop, recordings, saved configs.

pub mod recordings;
pub mod settings;
pub mod tasks;
pub mod ws;

use crate::error::TaskpilotError;
use crate::state::AppState;
use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub type ApiState = Arc<AppState>;

pub(crate) type ApiResult<T> = Result<T, (StatusCode, String)>;

pub(crate) fn api_err(e: TaskpilotError) -> (StatusCode, String) {
    (e.status_code(), e.to_string())
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/:task_id", get(ws::ws_handler))
        .merge(tasks::router())
        .merge(recordings::router())
        .merge(settings::router())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the full API app (router + concurrency limit + CORS).
/// Used by run_server and by integration tests.
pub fn app(state: ApiState) -> Router {
    let limit = state.config.concurrency_limit;
    let cors = cors_layer(&state.config.cors_allowed_origins);
    router(state)
        .layer(ConcurrencyLimitLayer::new(limit))
        .layer(cors)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<axum::http::HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(parsed))
}

/// Serve on an already-bound listener until `shutdown` resolves, then stop
/// every live task.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    state: ApiState,
    shutdown: F,
) -> Result<(), String>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = Arc::clone(&state.registry);
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| e.to_string())?;
    tracing::info!("API server stopped; cancelling {} tasks", registry.len());
    registry.cancel_all();
    Ok(())
}

pub async fn run_server(state: ApiState) -> Result<(), String> {
    let addr = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind API address {}: {}", addr, e))?;
    tracing::info!(
        "Taskpilot API listening on http://{} ({} driver)",
        addr,
        state.executor.driver_name()
    );
    serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}
