//! Recording HTTP handlers.

use super::{api_err, ApiResult, ApiState};
use crate::recording::RecordingInfo;
use axum::{
    extract::{Path as AxumPath, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/recordings", get(list_recordings))
        .route("/recordings/:filename", get(get_recording))
}

#[derive(Debug, Serialize)]
struct RecordingList {
    recordings: Vec<RecordingInfo>,
}

async fn list_recordings(State(state): State<ApiState>) -> ApiResult<Json<RecordingList>> {
    let recordings = state.recordings.list().await.map_err(api_err)?;
    Ok(Json(RecordingList { recordings }))
}

async fn get_recording(
    State(state): State<ApiState>,
    AxumPath(filename): AxumPath<String>,
) -> ApiResult<Response> {
    let (bytes, content_type) = state.recordings.open(&filename).await.map_err(api_err)?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
