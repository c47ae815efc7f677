//! zqa-ts library - ZIP quality analysis task service
//!
//! Clients upload a ZIP archive, receive a task id immediately, and poll for
//! the analysis report while a background unit processes the archive.

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use api::Authenticator;
use services::TaskService;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Task lifecycle manager
    pub service: TaskService,
    pub authenticator: Arc<dyn Authenticator>,
    /// Service start time, for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: TaskService, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            service,
            authenticator,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// `/upload` and `/results` sit behind the auth middleware; the health checks do not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let body_limit =
        usize::try_from(state.service.policy().max_request_bytes()).unwrap_or(usize::MAX);

    // Protected routes (require authentication)
    let protected = Router::new()
        .route("/upload", post(api::upload_archive))
        .route("/results/:task_id", get(api::get_results))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(protected)
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
