//! Health and startup checks

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// Module name ("zqa-ts")
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    /// Most recent background failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.service.scheduler().errors().last_error().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "zqa-ts".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        last_error,
    })
}

/// GET /check_startup/
pub async fn check_startup() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/check_startup/", get(check_startup))
}
