// Screen sharing session
//
// Display capture runs beside the camera stream. A share can end two ways:
// the user clicks our "stop sharing" control, or the browser's own sharing
// indicator ends the track. Both paths go through `Shared::teardown`, so the
// observable state is identical whichever way the share stopped.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::media::{MediaDevices, MediaKind, MediaStream, StreamView};

/// Observable screen share state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenShareState {
    pub is_screen_sharing: bool,
    pub stream_id: Option<String>,
}

struct Sharing {
    stream: Option<MediaStream>,
    /// Waits for the native "ended" event of the shared video track
    watcher: Option<JoinHandle<()>>,
    /// Attempt waiting on the display picker, if any
    pending: Option<u64>,
    attempts: u64,
}

struct Shared {
    sharing: Mutex<Sharing>,
    changes: watch::Sender<ScreenShareState>,
}

impl Shared {
    fn snapshot(sharing: &Sharing) -> ScreenShareState {
        ScreenShareState {
            is_screen_sharing: sharing.stream.is_some(),
            stream_id: sharing.stream.as_ref().map(|s| s.id().to_string()),
        }
    }

    /// Single exit path for a share
    ///
    /// With `only` set, tears down only if that stream is still the current
    /// one, so a watcher left over from an earlier share cannot end a newer
    /// one. Returns whether a share was stopped.
    fn teardown(&self, only: Option<&str>) -> bool {
        let mut sharing = self.sharing.lock();

        let current = match &sharing.stream {
            Some(stream) => stream.id().to_string(),
            None => return false,
        };
        if only.is_some_and(|id| id != current) {
            debug!("Ignoring ended event for stale share {:?}", only);
            return false;
        }

        if let Some(stream) = sharing.stream.take() {
            stream.stop();
        }
        if let Some(watcher) = sharing.watcher.take() {
            watcher.abort();
        }
        info!("Screen share {} stopped", current);

        self.changes.send_replace(Self::snapshot(&sharing));
        true
    }
}

/// Clears the pending marker if a start future is dropped at the picker
struct PendingShare<'a> {
    shared: &'a Shared,
    attempt: u64,
    armed: bool,
}

impl PendingShare<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingShare<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut sharing = self.shared.sharing.lock();
        if sharing.pending == Some(self.attempt) {
            warn!("Screen share attempt {} cancelled at the picker", self.attempt);
            sharing.pending = None;
        }
    }
}

/// Screen share controller
pub struct ScreenShare {
    devices: Arc<dyn MediaDevices>,
    shared: Arc<Shared>,
}

impl ScreenShare {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        let (changes, _) = watch::channel(ScreenShareState::default());
        Self {
            devices,
            shared: Arc::new(Shared {
                sharing: Mutex::new(Sharing {
                    stream: None,
                    watcher: None,
                    pending: None,
                    attempts: 0,
                }),
                changes,
            }),
        }
    }

    /// Prompt for a screen, window or tab and start sharing it
    ///
    /// Sharing already, or a prompt already open, is a successful no-op.
    pub async fn start_screen_share(&self) -> Result<ScreenShareState, CaptureError> {
        let attempt = {
            let mut sharing = self.shared.sharing.lock();
            if sharing.stream.is_some() || sharing.pending.is_some() {
                debug!("Screen share already active or pending");
                return Ok(Shared::snapshot(&sharing));
            }
            sharing.attempts += 1;
            sharing.pending = Some(sharing.attempts);
            sharing.attempts
        };

        info!("Requesting display capture (attempt {})", attempt);
        let pending = PendingShare {
            shared: &self.shared,
            attempt,
            armed: true,
        };
        let result = self.devices.get_display_media().await;
        pending.disarm();

        let mut sharing = self.shared.sharing.lock();
        if sharing.pending != Some(attempt) {
            // Stopped while the picker was open
            if let Ok(stream) = result {
                warn!("Discarding display stream {} from a cancelled share", stream.id());
                stream.stop();
            }
            return Ok(Shared::snapshot(&sharing));
        }
        sharing.pending = None;

        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Display capture failed: {}", err);
                return Err(CaptureError::from(&err));
            }
        };

        if let Some(track) = stream.first_track(MediaKind::Video).cloned() {
            let shared: Weak<Shared> = Arc::downgrade(&self.shared);
            let stream_id = stream.id().to_string();
            sharing.watcher = Some(tokio::spawn(async move {
                track.ended().await;
                if let Some(shared) = shared.upgrade() {
                    if shared.teardown(Some(&stream_id)) {
                        info!("Screen share ended from the browser");
                    }
                }
            }));
        }

        info!("Screen share {} started", stream.id());
        sharing.stream = Some(stream);

        let state = Shared::snapshot(&sharing);
        self.shared.changes.send_replace(state.clone());
        Ok(state)
    }

    /// Stop sharing; false when nothing was being shared
    ///
    /// Also cancels a share whose picker is still open, so its stream is
    /// discarded on arrival.
    pub fn stop_screen_share(&self) -> bool {
        if let Some(attempt) = self.shared.sharing.lock().pending.take() {
            info!("Cancelling pending screen share attempt {}", attempt);
        }
        let stopped = self.shared.teardown(None);
        if !stopped {
            debug!("stop_screen_share called with no active share");
        }
        stopped
    }

    pub fn is_screen_sharing(&self) -> bool {
        self.shared.sharing.lock().stream.is_some()
    }

    pub fn screen_stream(&self) -> Option<StreamView> {
        self.shared
            .sharing
            .lock()
            .stream
            .as_ref()
            .map(MediaStream::view)
    }

    pub fn state(&self) -> ScreenShareState {
        Shared::snapshot(&self.shared.sharing.lock())
    }

    pub fn subscribe(&self) -> watch::Receiver<ScreenShareState> {
        self.shared.changes.subscribe()
    }
}

impl Drop for ScreenShare {
    fn drop(&mut self) {
        self.shared.teardown(None);
    }
}
