//! Log filter routes.

use axum::{Json, Router, extract::State, routing::get};
use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct LoggingConfigResponse {
    pub filter: String,
    pub log_dir: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLogFilterRequest {
    pub filter: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_logging_config).put(update_logging_config))
}

fn logging_config(state: &AppState) -> ApiResult<&crate::logging::LoggingConfig> {
    state
        .logging_config
        .as_deref()
        .ok_or_else(|| ApiError::internal("Logging configuration not available"))
}

async fn get_logging_config(
    State(state): State<AppState>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    Ok(Json(LoggingConfigResponse {
        filter: config.get_filter(),
        log_dir: config.log_dir().display().to_string(),
    }))
}

async fn update_logging_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateLogFilterRequest>,
) -> ApiResult<Json<LoggingConfigResponse>> {
    let config = logging_config(&state)?;
    config.set_filter(&req.filter)?;
    Ok(Json(LoggingConfigResponse {
        filter: config.get_filter(),
        log_dir: config.log_dir().display().to_string(),
    }))
}
