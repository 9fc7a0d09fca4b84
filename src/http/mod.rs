//! HTTP API for classroom UI observers
//!
//! This module exposes each room's media state and operations:
//! - POST/GET/DELETE /rooms/:id - Create, inspect, close a room participant
//! - POST /rooms/:id/join, /leave - Capture session lifecycle
//! - POST /rooms/:id/microphone/toggle, /camera/toggle - Track toggles
//! - POST /rooms/:id/preflight/{camera,microphone,speaker,cleanup} - Device checks
//! - POST /rooms/:id/screen-share/{start,stop} - Screen share
//! - POST /rooms/:id/recording/{start,stop} - Recording (teachers only)
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
