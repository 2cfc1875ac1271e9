//! Dashboard status route.

use axum::{Json, Router, extract::State, routing::post};

use crate::api::server::AppState;
use crate::api::status::Dashboard;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(exchange_status))
}

/// Store (or, with `"?"`, read) the dashboard selection and list targets.
async fn exchange_status(
    State(state): State<AppState>,
    Json(req): Json<Dashboard>,
) -> Json<Dashboard> {
    Json(state.board.status(&req))
}
