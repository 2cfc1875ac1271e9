//! Target management routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::track::TargetInfo;

/// Request body naming one target.
#[derive(Debug, Deserialize)]
pub struct LinkRequest {
    pub link: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkResponse {
    pub link: String,
    /// Whether the link is tracked after the request.
    pub tracking: bool,
}

impl LinkResponse {
    fn for_link(state: &AppState, link: &str) -> Self {
        let link = link.trim().to_string();
        let tracking = state.registry.contains(&link);
        Self { link, tracking }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(list_targets).post(add_target).delete(remove_target),
        )
        .route("/cancel", post(cancel_target))
}

async fn list_targets(State(state): State<AppState>) -> Json<Vec<TargetInfo>> {
    Json(state.registry.list())
}

async fn add_target(
    State(state): State<AppState>,
    Json(req): Json<LinkRequest>,
) -> ApiResult<(StatusCode, Json<LinkResponse>)> {
    let existed = state.registry.contains(req.link.trim());
    state.registry.add_target(&state.ctx, &req.link).await?;
    let status = if existed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(LinkResponse::for_link(&state, &req.link))))
}

async fn remove_target(
    State(state): State<AppState>,
    Json(req): Json<LinkRequest>,
) -> ApiResult<Json<LinkResponse>> {
    state.registry.remove_target(&state.ctx, &req.link).await?;
    Ok(Json(LinkResponse::for_link(&state, &req.link)))
}

async fn cancel_target(
    State(state): State<AppState>,
    Json(req): Json<LinkRequest>,
) -> ApiResult<Json<LinkResponse>> {
    state.registry.cancel_target(&req.link)?;
    Ok(Json(LinkResponse::for_link(&state, &req.link)))
}
