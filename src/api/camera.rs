use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::api::state::AppState;
use crate::error::Result;
use crate::services::recognition::{PtzCommand, PtzMove, RecognitionService};

type Recognition = State<Arc<dyn RecognitionService>>;

/// Relay the live camera stream
async fn video_feed(State(recognition): Recognition) -> Result<Response> {
    let feed = recognition.video_feed().await?;

    Ok((
        [
            (header::CONTENT_TYPE, feed.content_type),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(feed.stream),
    )
        .into_response())
}

async fn ptz_move(
    State(recognition): Recognition,
    payload: std::result::Result<Json<PtzMove>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(movement) = payload?;
    tracing::debug!(pan = movement.pan, tilt = movement.tilt, "PTZ move");
    Ok(Json(recognition.ptz(PtzCommand::Move(movement)).await?))
}

async fn ptz_home(State(recognition): Recognition) -> Result<Json<Value>> {
    Ok(Json(recognition.ptz(PtzCommand::Home).await?))
}

async fn patrol_start(State(recognition): Recognition) -> Result<Json<Value>> {
    Ok(Json(recognition.ptz(PtzCommand::PatrolStart).await?))
}

async fn patrol_stop(State(recognition): Recognition) -> Result<Json<Value>> {
    Ok(Json(recognition.ptz(PtzCommand::PatrolStop).await?))
}

async fn patrol_status(State(recognition): Recognition) -> Result<Json<Value>> {
    Ok(Json(recognition.ptz(PtzCommand::PatrolStatus).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/camera/video_feed", get(video_feed))
        .route("/camera/ptz/move", post(ptz_move))
        .route("/camera/ptz/home", post(ptz_home))
        .route("/camera/ptz/patrol/start", post(patrol_start))
        .route("/camera/ptz/patrol/stop", post(patrol_stop))
        .route("/camera/ptz/patrol/status", get(patrol_status))
}
