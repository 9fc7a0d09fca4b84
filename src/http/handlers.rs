use super::state::AppState;
use crate::classroom::{Classroom, ClassroomSnapshot, Role};
use crate::error::{ClassroomError, RecordingError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct CloseRoomResponse {
    pub room_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopScreenShareResponse {
    pub stopped: bool,
    pub room: ClassroomSnapshot,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    pub room_id: String,
    pub file_name: String,
    pub path: String,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

async fn find_room(state: &AppState, room_id: &str) -> Result<Arc<Classroom>, Response> {
    let rooms = state.rooms.read().await;
    rooms.get(room_id).cloned().ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            format!("Room {} not found", room_id),
        )
    })
}

fn classroom_error_response(err: ClassroomError) -> Response {
    let status = match &err {
        ClassroomError::NotAuthorized { .. } => StatusCode::FORBIDDEN,
        ClassroomError::Recording(RecordingError::NoStream) => StatusCode::BAD_REQUEST,
        ClassroomError::Recording(RecordingError::AlreadyRecording) => StatusCode::CONFLICT,
        ClassroomError::Recording(RecordingError::Recorder(_)) | ClassroomError::Capture(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    warn!("Request rejected: {}", err);
    error_response(status, err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// POST /rooms/:room_id
/// Create the local participant for a room
pub async fn create_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Json(req): Json<CreateRoomRequest>,
) -> Response {
    let mut rooms = state.rooms.write().await;
    if rooms.contains_key(&room_id) {
        return error_response(
            StatusCode::CONFLICT,
            format!("Room {} already exists", room_id),
        );
    }

    let classroom = Arc::new(Classroom::new(
        room_id.clone(),
        req.role,
        Arc::clone(&state.devices),
        state.probe,
        &state.config,
    ));
    let snapshot = classroom.snapshot();
    rooms.insert(room_id.clone(), classroom);

    info!("Room {} created as {:?}", room_id, req.role);
    (StatusCode::CREATED, Json(snapshot)).into_response()
}

/// DELETE /rooms/:room_id
/// Release all devices and forget the room
pub async fn close_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    let classroom = {
        let mut rooms = state.rooms.write().await;
        rooms.remove(&room_id)
    };

    match classroom {
        Some(classroom) => {
            classroom.close();
            (
                StatusCode::OK,
                Json(CloseRoomResponse {
                    room_id,
                    status: "closed".to_string(),
                }),
            )
                .into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, format!("Room {} not found", room_id)),
    }
}

/// GET /rooms/:room_id
pub async fn get_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    match find_room(&state, &room_id).await {
        Ok(classroom) => Json(classroom.snapshot()).into_response(),
        Err(resp) => resp,
    }
}

/// POST /rooms/:room_id/join
/// Device failures are reported in `capture.error`, not as an HTTP error
pub async fn join_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    let capture = classroom.enter().await;
    if let Some(err) = &capture.error {
        warn!("Room {} join failed: {}", room_id, err);
    }
    Json(classroom.snapshot()).into_response()
}

/// POST /rooms/:room_id/leave
pub async fn leave_room(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    with_room(&state, &room_id, |classroom| {
        classroom.leave();
    })
    .await
}

/// POST /rooms/:room_id/microphone/toggle
pub async fn toggle_microphone(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    with_room(&state, &room_id, |classroom| {
        classroom.capture().toggle_microphone();
    })
    .await
}

/// POST /rooms/:room_id/camera/toggle
pub async fn toggle_camera(State(state): State<AppState>, Path(room_id): Path<String>) -> Response {
    with_room(&state, &room_id, |classroom| {
        classroom.capture().toggle_camera();
    })
    .await
}

/// POST /rooms/:room_id/preflight/camera
pub async fn preflight_camera(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    classroom.preflight().run_camera_check().await;
    Json(classroom.snapshot()).into_response()
}

/// POST /rooms/:room_id/preflight/microphone
pub async fn preflight_microphone(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    classroom.preflight().run_mic_check().await;
    Json(classroom.snapshot()).into_response()
}

/// POST /rooms/:room_id/preflight/speaker
pub async fn confirm_speaker(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    with_room(&state, &room_id, |classroom| {
        classroom.preflight().confirm_speaker();
    })
    .await
}

/// POST /rooms/:room_id/preflight/cleanup
pub async fn preflight_cleanup(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    with_room(&state, &room_id, |classroom| classroom.preflight().cleanup()).await
}

/// POST /rooms/:room_id/screen-share/start
pub async fn start_screen_share(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    match classroom.start_screen_share().await {
        Ok(_) => Json(classroom.snapshot()).into_response(),
        Err(err) => classroom_error_response(err),
    }
}

/// POST /rooms/:room_id/screen-share/stop
pub async fn stop_screen_share(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    let stopped = classroom.screen_share().stop_screen_share();
    Json(StopScreenShareResponse {
        stopped,
        room: classroom.snapshot(),
    })
    .into_response()
}

/// POST /rooms/:room_id/recording/start
pub async fn start_recording(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    match classroom.start_recording() {
        Ok(_) => Json(classroom.snapshot()).into_response(),
        Err(err) => classroom_error_response(err),
    }
}

/// POST /rooms/:room_id/recording/stop
/// Finish the recording, save it under its download name and release the blob
pub async fn stop_recording(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Response {
    let classroom = match find_room(&state, &room_id).await {
        Ok(classroom) => classroom,
        Err(resp) => return resp,
    };

    if !classroom.recording().is_recording() {
        return error_response(
            StatusCode::CONFLICT,
            format!("Room {} has no active recording", room_id),
        );
    }

    let url = match classroom.stop_recording() {
        Some(url) => url,
        None => {
            error!("Recorder for room {} failed to finalize", room_id);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Recording for room {} could not be finalized", room_id),
            );
        }
    };

    let saved = state.config.recording.recordings_dir().and_then(|dir| {
        classroom
            .recording()
            .save_recording(&url, dir, &room_id, Utc::now())
    });
    let bytes = classroom
        .recording()
        .recording_blob(&url)
        .map(|blob| blob.len())
        .unwrap_or_default();
    classroom.recording().revoke_recording_url(&url);

    match saved {
        Ok(path) => (
            StatusCode::OK,
            Json(StopRecordingResponse {
                room_id,
                file_name: path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path: path.display().to_string(),
                bytes,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to save recording: {:#}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to save recording: {}", e),
            )
        }
    }
}

/// Run a synchronous room operation and answer with the room snapshot
async fn with_room(state: &AppState, room_id: &str, op: impl FnOnce(&Classroom)) -> Response {
    match find_room(state, room_id).await {
        Ok(classroom) => {
            op(&classroom);
            Json(classroom.snapshot()).into_response()
        }
        Err(resp) => resp,
    }
}
