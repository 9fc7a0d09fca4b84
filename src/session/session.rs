use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::state::CaptureState;
use crate::error::CaptureError;
use crate::media::{EnvironmentProbe, MediaDevices, MediaKind, MediaStream, MediaStreamConstraints, StreamView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Waiting on the permission prompt for the given attempt
    Connecting { attempt: u64 },
    Connected,
}

struct Inner {
    phase: Phase,
    stream: Option<MediaStream>,
    is_muted: bool,
    is_camera_off: bool,
    error: Option<String>,
    /// Bumped by every join attempt and every leave; a pending join whose
    /// attempt no longer matches has been superseded
    attempts: u64,
}

impl Inner {
    fn snapshot(&self) -> CaptureState {
        let is_connected = self.phase == Phase::Connected
            && self.stream.as_ref().is_some_and(MediaStream::active);

        CaptureState {
            is_connected,
            is_connecting: matches!(self.phase, Phase::Connecting { .. }),
            is_muted: is_connected && self.is_muted,
            is_camera_off: is_connected && self.is_camera_off,
            error: self.error.clone(),
            stream_id: self.stream.as_ref().map(|s| s.id().to_string()),
        }
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
            info!("Released local stream {}", stream.id());
        }
    }

    fn reset_flags(&mut self) {
        self.is_muted = false;
        self.is_camera_off = false;
    }
}

/// Clears `Connecting` if a join future is dropped at the permission prompt
struct PendingJoin<'a> {
    session: &'a CaptureSession,
    attempt: u64,
    armed: bool,
}

impl PendingJoin<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingJoin<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.session.inner.lock();
        if inner.phase == (Phase::Connecting { attempt: self.attempt }) {
            warn!("Join attempt {} cancelled while waiting on the prompt", self.attempt);
            inner.phase = Phase::Idle;
            self.session.publish(&inner);
        }
    }
}

/// Owns the local participant's camera and microphone for a classroom
///
/// States: `Idle -> Connecting -> Connected -> Idle`, with
/// `Connecting -> Idle` (plus an error message) when acquisition fails.
/// Mute and camera-off are track-level flags on the connected stream.
///
/// Every operation publishes the new [`CaptureState`] to subscribers before
/// returning. The state lock is never held across an `.await`, so the
/// session can be shared between tasks.
pub struct CaptureSession {
    devices: Arc<dyn MediaDevices>,
    probe: EnvironmentProbe,
    constraints: MediaStreamConstraints,
    inner: Mutex<Inner>,
    changes: watch::Sender<CaptureState>,
}

impl CaptureSession {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        probe: EnvironmentProbe,
        constraints: MediaStreamConstraints,
    ) -> Self {
        let (changes, _) = watch::channel(CaptureState::default());
        Self {
            devices,
            probe,
            constraints,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                stream: None,
                is_muted: false,
                is_camera_off: false,
                error: None,
                attempts: 0,
            }),
            changes,
        }
    }

    /// Acquire camera and microphone and enter the connected state
    ///
    /// Failures never escape: they are stored as the user-facing `error`
    /// of the returned (and published) state.
    pub async fn join(&self) -> CaptureState {
        let attempt = {
            let mut inner = self.inner.lock();

            if let Phase::Connecting { attempt } = inner.phase {
                debug!("Join attempt {} already pending, ignoring duplicate", attempt);
                return inner.snapshot();
            }

            match inner.stream.as_ref().map(MediaStream::active) {
                Some(true) => {
                    debug!("Reusing active stream");
                    inner.phase = Phase::Connected;
                    inner.error = None;
                    return self.publish(&inner);
                }
                Some(false) => {
                    // Every track ended underneath us (device unplugged); start over
                    inner.release_stream();
                    inner.reset_flags();
                }
                None => {}
            }

            if let Err(err) = self.probe.check() {
                warn!("Cannot join: {:?}", err);
                inner.phase = Phase::Idle;
                inner.error = Some(err.to_string());
                return self.publish(&inner);
            }

            inner.attempts += 1;
            let attempt = inner.attempts;
            inner.phase = Phase::Connecting { attempt };
            inner.error = None;
            self.publish(&inner);
            attempt
        };

        info!(
            "Requesting camera and microphone (attempt {}, backend {})",
            attempt,
            self.devices.name()
        );
        let pending = PendingJoin {
            session: self,
            attempt,
            armed: true,
        };
        let result = self.devices.get_user_media(&self.constraints).await;
        pending.disarm();

        let mut inner = self.inner.lock();
        let still_wanted = inner.phase == Phase::Connecting { attempt };

        match result {
            Ok(stream) if !still_wanted => {
                warn!(
                    "Join attempt {} superseded by leave, discarding stream {}",
                    attempt,
                    stream.id()
                );
                stream.stop();
                inner.snapshot()
            }
            Err(err) if !still_wanted => {
                debug!("Join attempt {} superseded, ignoring failure: {}", attempt, err);
                inner.snapshot()
            }
            Ok(stream) => {
                info!(
                    "Joined with stream {} ({} audio, {} video tracks)",
                    stream.id(),
                    stream.audio_tracks().count(),
                    stream.video_tracks().count()
                );
                inner.stream = Some(stream);
                inner.phase = Phase::Connected;
                inner.reset_flags();
                inner.error = None;
                self.publish(&inner)
            }
            Err(err) => {
                let classified = CaptureError::from(&err);
                warn!("Failed to access media devices: {} ({:?})", err, classified);
                inner.phase = Phase::Idle;
                inner.error = Some(classified.to_string());
                self.publish(&inner)
            }
        }
    }

    /// Release all devices and reset to idle; safe to call in any state
    pub fn leave(&self) -> CaptureState {
        let mut inner = self.inner.lock();

        if inner.phase == Phase::Idle && inner.stream.is_none() && inner.error.is_none() {
            debug!("Leave called while idle");
            return inner.snapshot();
        }

        info!("Leaving session");
        // Invalidate any pending join so its late result is discarded
        inner.attempts += 1;
        inner.release_stream();
        inner.phase = Phase::Idle;
        inner.reset_flags();
        inner.error = None;
        self.publish(&inner)
    }

    /// Mute or unmute the first audio track
    pub fn toggle_microphone(&self) -> CaptureState {
        self.toggle_track(MediaKind::Audio)
    }

    /// Turn the first video track off or on
    pub fn toggle_camera(&self) -> CaptureState {
        self.toggle_track(MediaKind::Video)
    }

    fn toggle_track(&self, kind: MediaKind) -> CaptureState {
        let mut inner = self.inner.lock();

        let track = match &inner.stream {
            Some(stream) if inner.phase == Phase::Connected && stream.active() => {
                stream.first_track(kind).cloned()
            }
            _ => {
                warn!("Cannot toggle {:?}: no active stream", kind);
                return inner.snapshot();
            }
        };

        let track = match track {
            Some(track) => track,
            None => {
                warn!("Cannot toggle {:?}: stream has no such track", kind);
                return inner.snapshot();
            }
        };

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        match kind {
            MediaKind::Audio => inner.is_muted = !enabled,
            MediaKind::Video => inner.is_camera_off = !enabled,
        }
        info!("{:?} track {} enabled={}", kind, track.id(), enabled);

        self.publish(&inner)
    }

    /// Current state snapshot
    pub fn state(&self) -> CaptureState {
        self.inner.lock().snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected
    }

    /// Read-only handle on the held stream, for rendering
    pub fn stream(&self) -> Option<StreamView> {
        self.inner.lock().stream.as_ref().map(MediaStream::view)
    }

    /// Receive every published state change
    pub fn subscribe(&self) -> watch::Receiver<CaptureState> {
        self.changes.subscribe()
    }

    fn publish(&self, inner: &Inner) -> CaptureState {
        let state = inner.snapshot();
        self.changes.send_replace(state.clone());
        state
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        // Leaving the page must not leave the camera light on
        self.inner.get_mut().release_stream();
    }
}
