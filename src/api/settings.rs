//! Saved configuration HTTP handlers.

use super::{api_err, ApiResult, ApiState};
use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/config/save", post(save_config))
        .route("/config/load", post(load_config))
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    config_id: String,
}

#[derive(Debug, Deserialize)]
struct LoadQuery {
    config_id: String,
}

async fn save_config(
    State(state): State<ApiState>,
    Json(config): Json<Value>,
) -> ApiResult<Json<SaveResponse>> {
    let config_id = state.saved_configs.save(&config).await.map_err(api_err)?;
    Ok(Json(SaveResponse { config_id }))
}

async fn load_config(
    State(state): State<ApiState>,
    Query(query): Query<LoadQuery>,
) -> ApiResult<Json<Value>> {
    let config = state
        .saved_configs
        .load(&query.config_id)
        .await
        .map_err(api_err)?;
    Ok(Json(config))
}
