//! REST API route definitions

use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::{get, post},
    Router,
};
use mediasync_core::{Command, SyncError};
use tracing::info;

use super::server::AppState;
use crate::error::ControlError;
use crate::protocol::{CommandAck, ControlRequest, LoadRequest, SeekRequest, StatusSnapshot};
use crate::Result;

/// Build the API router
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/api/load", post(load))
        .route("/api/play", post(play))
        .route("/api/pause", post(pause))
        .route("/api/seek", post(seek))
        .route("/api/status", get(get_status))
}

/// Unreadable bodies are the caller's fault
fn body_or_invalid<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ControlError::Sync(SyncError::InvalidArgument(rejection.body_text()))
    })
}

fn submit(state: &AppState, command: Command, based_on: Option<u64>) -> Result<Json<CommandAck>> {
    let event = state.hub.submit(command, based_on)?;
    Ok(Json(CommandAck::ok(event.revision)))
}

/// POST /api/load - Replace the current media
async fn load(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoadRequest>, JsonRejection>,
) -> Result<Json<CommandAck>> {
    let request = body_or_invalid(body)?;
    let based_on = request.based_on;
    let command = request.into_command()?;
    if let Command::Load { url, media_type, .. } = &command {
        info!("REST load: {} ({})", url, media_type);
    }
    submit(&state, command, based_on)
}

/// POST /api/play - Start or resume playback
async fn play(
    State(state): State<AppState>,
    body: Option<Json<ControlRequest>>,
) -> Result<Json<CommandAck>> {
    let based_on = body.and_then(|Json(request)| request.based_on);
    submit(&state, Command::Play, based_on)
}

/// POST /api/pause - Pause playback
async fn pause(
    State(state): State<AppState>,
    body: Option<Json<ControlRequest>>,
) -> Result<Json<CommandAck>> {
    let based_on = body.and_then(|Json(request)| request.based_on);
    submit(&state, Command::Pause, based_on)
}

/// POST /api/seek - Move the playback position
async fn seek(
    State(state): State<AppState>,
    body: std::result::Result<Json<SeekRequest>, JsonRejection>,
) -> Result<Json<CommandAck>> {
    let request = body_or_invalid(body)?;
    let based_on = request.based_on;
    submit(&state, request.into_command()?, based_on)
}

/// GET /api/status - Current authoritative state
async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.hub.snapshot())
}
