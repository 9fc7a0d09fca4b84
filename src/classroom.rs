//! One local participant in a classroom
//!
//! Ties together the capture session, pre-flight checks, screen share and
//! recording for a room, and applies the policies the individual managers
//! leave to their caller: only teachers record, pre-flight devices are
//! released before joining, and the recording duration clock runs here.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::ClassroomError;
use crate::media::{EnvironmentProbe, MediaDevices, MediaStreamConstraints};
use crate::preflight::{PreflightCheck, PreflightState};
use crate::recording::{RecordingSession, RecordingState};
use crate::screencapture::{ScreenShare, ScreenShareState};
use crate::session::{CaptureSession, CaptureState};

/// Participant role on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    Parent,
    Admin,
}

impl Role {
    pub fn can_record(&self) -> bool {
        matches!(self, Role::Teacher)
    }
}

/// Everything a classroom UI renders, in one value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassroomSnapshot {
    pub room_id: String,
    pub role: Role,
    pub capture: CaptureState,
    pub preflight: PreflightState,
    pub all_passed: bool,
    pub screen_share: ScreenShareState,
    pub recording: RecordingState,
}

pub struct Classroom {
    room_id: String,
    role: Role,
    capture: CaptureSession,
    preflight: PreflightCheck,
    screen_share: ScreenShare,
    recording: Arc<RecordingSession>,
    tick_interval: Duration,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Classroom {
    pub fn new(
        room_id: impl Into<String>,
        role: Role,
        devices: Arc<dyn MediaDevices>,
        probe: EnvironmentProbe,
        config: &Config,
    ) -> Self {
        let room_id = room_id.into();
        info!("Creating classroom {} as {:?}", room_id, role);

        let constraints = MediaStreamConstraints::classroom(
            config.capture.audio.clone(),
            config.capture.video.clone(),
        );

        Self {
            capture: CaptureSession::new(Arc::clone(&devices), probe, constraints),
            preflight: PreflightCheck::new(Arc::clone(&devices), &config.capture, &config.preflight),
            screen_share: ScreenShare::new(Arc::clone(&devices)),
            recording: Arc::new(RecordingSession::new(devices, config.recording.mime_type.clone())),
            tick_interval: Duration::from_millis(config.recording.tick_interval_ms.max(1)),
            ticker: Mutex::new(None),
            room_id,
            role,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn capture(&self) -> &CaptureSession {
        &self.capture
    }

    pub fn preflight(&self) -> &PreflightCheck {
        &self.preflight
    }

    pub fn screen_share(&self) -> &ScreenShare {
        &self.screen_share
    }

    pub fn recording(&self) -> &RecordingSession {
        &self.recording
    }

    /// Leave the pre-flight screen and join the class
    pub async fn enter(&self) -> CaptureState {
        self.preflight.cleanup();
        self.capture.join().await
    }

    pub fn leave(&self) -> CaptureState {
        self.capture.leave()
    }

    pub async fn start_screen_share(&self) -> Result<ScreenShareState, ClassroomError> {
        Ok(self.screen_share.start_screen_share().await?)
    }

    /// Record the local stream; teachers only
    pub fn start_recording(&self) -> Result<RecordingState, ClassroomError> {
        if !self.role.can_record() {
            return Err(ClassroomError::NotAuthorized {
                action: "start a recording",
            });
        }

        let stream = self.capture.stream().filter(|s| s.active());
        self.recording.start_recording(stream.as_ref())?;

        let recording = Arc::clone(&self.recording);
        let interval = self.tick_interval;
        let ticker = tokio::spawn(async move {
            let mut clock = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                clock.tick().await;
                if !recording.is_recording() {
                    break;
                }
                recording.update_recording_duration();
            }
        });
        if let Some(previous) = self.ticker.lock().replace(ticker) {
            previous.abort();
        }

        Ok(self.recording.state())
    }

    /// Finish the recording and return its object URL
    pub fn stop_recording(&self) -> Option<String> {
        if let Some(ticker) = self.ticker.lock().take() {
            ticker.abort();
        }
        self.recording.stop_recording()
    }

    pub fn snapshot(&self) -> ClassroomSnapshot {
        let preflight = self.preflight.state();
        ClassroomSnapshot {
            room_id: self.room_id.clone(),
            role: self.role,
            capture: self.capture.state(),
            all_passed: preflight.all_passed(),
            preflight,
            screen_share: self.screen_share.state(),
            recording: self.recording.state(),
        }
    }

    /// Release every device this participant holds
    pub fn close(&self) {
        info!("Closing classroom {}", self.room_id);
        if self.recording.is_recording() {
            if let Some(url) = self.stop_recording() {
                self.recording.revoke_recording_url(&url);
            }
        }
        self.screen_share.stop_screen_share();
        self.preflight.cleanup();
        self.capture.leave();
    }
}

impl Drop for Classroom {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.abort();
        }
    }
}
