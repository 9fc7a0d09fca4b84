//! Error types for media capture, recording and the classroom facade
//!
//! Capture failures double as user-facing messages: the `Display` text of a
//! [`CaptureError`] is what the UI renders in its error banner, so each
//! variant names the remediation (grant permission, close another app,
//! connect a device).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a device backend
///
/// Mirrors the platform's DOMException: `name` identifies the failure class
/// (`NotAllowedError`, `NotFoundError`, ...), `message` is free-form detail.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct DeviceError {
    pub name: String,
    pub message: String,
}

impl DeviceError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied() -> Self {
        Self::new("NotAllowedError", "Permission denied")
    }

    pub fn not_found() -> Self {
        Self::new("NotFoundError", "Requested device not found")
    }

    pub fn busy() -> Self {
        Self::new("NotReadableError", "Could not start video source")
    }

    pub fn overconstrained() -> Self {
        Self::new("OverconstrainedError", "Constraints could not be satisfied")
    }
}

/// Why media capture is unavailable or failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureError {
    #[error("HTTPS is required for camera and microphone access. Please use HTTPS or localhost.")]
    InsecureContext,

    #[error("Your browser does not support camera and microphone access. Please use a modern browser.")]
    Unsupported,

    #[error("Camera and microphone access denied. Please allow permissions and try again.")]
    PermissionDenied,

    #[error("No camera or microphone found. Please connect a device and try again.")]
    DeviceNotFound,

    #[error("Camera or microphone is already in use by another application.")]
    DeviceBusy,

    #[error("Camera or microphone doesn't meet the required constraints.")]
    ConstraintsUnsatisfiable,

    #[error("Unable to access camera or microphone.")]
    Unknown,
}

impl CaptureError {
    /// Environment errors are detected before any device is touched
    pub fn is_environment(&self) -> bool {
        matches!(self, Self::InsecureContext | Self::Unsupported)
    }
}

impl From<&DeviceError> for CaptureError {
    fn from(err: &DeviceError) -> Self {
        match err.name.as_str() {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => Self::PermissionDenied,
            "NotFoundError" | "DevicesNotFoundError" => Self::DeviceNotFound,
            "NotReadableError" | "TrackStartError" | "AbortError" => Self::DeviceBusy,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
                Self::ConstraintsUnsatisfiable
            }
            _ => Self::Unknown,
        }
    }
}

impl From<DeviceError> for CaptureError {
    fn from(err: DeviceError) -> Self {
        Self::from(&err)
    }
}

/// Recording pipeline errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("No stream available to record")]
    NoStream,

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Recorder failed: {0}")]
    Recorder(#[from] DeviceError),
}

/// Errors surfaced by the classroom facade
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassroomError {
    #[error("Only the teacher can {action}")]
    NotAuthorized { action: &'static str },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Recording(#[from] RecordingError),
}
