use serde::{Deserialize, Serialize};

/// Observable state of a capture session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureState {
    /// A live stream is held and installed
    pub is_connected: bool,

    /// A permission prompt is pending
    pub is_connecting: bool,

    /// First audio track disabled
    pub is_muted: bool,

    /// First video track disabled
    pub is_camera_off: bool,

    /// User-facing message from the last failed join
    pub error: Option<String>,

    /// Id of the held stream, if any
    pub stream_id: Option<String>,
}
