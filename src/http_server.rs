/// HTTP Server Module
///
/// Provides HTTP endpoints for health checks, viewing the poll status and
/// triggering an upload check by hand.
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;

use crate::config::Config;
use crate::poller::Poller;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub poller: Arc<Poller>,
}

/// Create and configure the HTTP server router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/poll", post(poll_endpoint))
        .route("/poll-status", get(poll_status_endpoint))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> Result<Json<serde_json::Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "upload_watch_bot",
        "timestamp": Utc::now().to_rfc3339()
    })))
}

/// Manual upload check endpoint
async fn poll_endpoint(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    // Check authentication if poll_api_secret is set
    if let Some(secret) = &state.config.poll_api_secret {
        let token = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        if token != Some(secret.as_str()) {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    log::info!("Upload check triggered via HTTP endpoint");

    let outcome = state.poller.run_cycle().await;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "result": outcome
    })))
}

/// Poll status endpoint
async fn poll_status_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let status = state.poller.status().await;
    let latest = state.poller.latest_upload().await;

    Ok(Json(serde_json::json!({
        "running": state.poller.is_running(),
        "last_poll": status.last_poll.map(|d| d.to_rfc3339()),
        "last_result": status.last_outcome,
        "total_cycles": status.total_cycles,
        "total_notified": status.total_notified,
        "latest_upload": latest
    })))
}

/// Start the HTTP server
pub async fn start_server(state: AppState, port: u16) -> Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .context("Failed to bind HTTP server")?;

    log::info!("HTTP server listening on port {}", port);

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}
