use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Room lifecycle
        .route(
            "/rooms/:room_id",
            post(handlers::create_room)
                .get(handlers::get_room)
                .delete(handlers::close_room),
        )
        // Capture session
        .route("/rooms/:room_id/join", post(handlers::join_room))
        .route("/rooms/:room_id/leave", post(handlers::leave_room))
        .route(
            "/rooms/:room_id/microphone/toggle",
            post(handlers::toggle_microphone),
        )
        .route("/rooms/:room_id/camera/toggle", post(handlers::toggle_camera))
        // Pre-flight checks
        .route(
            "/rooms/:room_id/preflight/camera",
            post(handlers::preflight_camera),
        )
        .route(
            "/rooms/:room_id/preflight/microphone",
            post(handlers::preflight_microphone),
        )
        .route(
            "/rooms/:room_id/preflight/speaker",
            post(handlers::confirm_speaker),
        )
        .route(
            "/rooms/:room_id/preflight/cleanup",
            post(handlers::preflight_cleanup),
        )
        // Screen share
        .route(
            "/rooms/:room_id/screen-share/start",
            post(handlers::start_screen_share),
        )
        .route(
            "/rooms/:room_id/screen-share/stop",
            post(handlers::stop_screen_share),
        )
        // Recording
        .route(
            "/rooms/:room_id/recording/start",
            post(handlers::start_recording),
        )
        .route(
            "/rooms/:room_id/recording/stop",
            post(handlers::stop_recording),
        )
        // Control bars run in the browser on another origin
        .layer(CorsLayer::permissive())
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
