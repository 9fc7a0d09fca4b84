pub mod classroom;
pub mod config;
pub mod error;
pub mod http;
pub mod media;
pub mod preflight;
pub mod recording;
pub mod screencapture;
pub mod session;

pub use classroom::{Classroom, ClassroomSnapshot, Role};
pub use config::Config;
pub use error::{CaptureError, ClassroomError, DeviceError, RecordingError};
pub use http::{create_router, AppState};
pub use media::{
    EnvironmentProbe, MediaDevices, MediaDevicesFactory, MediaKind, MediaStream,
    MediaStreamConstraints, SimulatedDevices, StreamView,
};
pub use preflight::{CheckStatus, PreflightCheck, PreflightState};
pub use recording::{RecordingSession, RecordingState};
pub use screencapture::{ScreenShare, ScreenShareState};
pub use session::{CaptureSession, CaptureState};
