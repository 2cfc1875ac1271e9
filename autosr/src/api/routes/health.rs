//! Health check routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    /// Number of tracked targets
    pub tracking: usize,
    /// Number of recordings in flight
    pub saving: usize,
}

/// Create the health router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.ctx.is_cancelled() {
        "shutting_down"
    } else {
        "healthy"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: crate::version().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tracking: state.registry.len(),
        saving: state.registry.saver().tasks().len(),
    })
}
