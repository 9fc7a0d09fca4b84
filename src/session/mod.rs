//! Local capture session management
//!
//! This module provides the `CaptureSession` state machine that owns:
//! - Camera and microphone acquisition (join/leave)
//! - Track-level mute and camera-off toggles
//! - Discarding of late acquisitions after an explicit leave
//! - Observable state for video tiles and control bars

mod session;
mod state;

pub use session::CaptureSession;
pub use state::CaptureState;
