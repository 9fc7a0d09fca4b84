use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::blob::{download_file_name, ObjectUrls, RecordingBlob};
use crate::error::RecordingError;
use crate::media::{MediaDevices, MediaRecorder, StreamView};

/// Recorder data is requested in slices of this length
const RECORDER_TIMESLICE_MS: u64 = 1000;

/// One duration clock tick
pub const DURATION_TICK_MS: u64 = 1000;

/// Observable recording state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingState {
    pub is_recording: bool,
    pub recording_duration_ms: u64,
    /// Object URL of the last finished recording
    pub recording_url: Option<String>,
}

struct Active {
    recorder: Box<dyn MediaRecorder>,
    chunk_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
}

impl Active {
    fn drain(&mut self) {
        while let Ok(chunk) = self.chunk_rx.try_recv() {
            self.chunks.push(chunk);
        }
    }
}

struct Inner {
    active: Option<Active>,
    duration_ms: u64,
    url: Option<String>,
}

impl Inner {
    fn snapshot(&self) -> RecordingState {
        RecordingState {
            is_recording: self.active.is_some(),
            recording_duration_ms: self.duration_ms,
            recording_url: self.url.clone(),
        }
    }
}

/// Records a stream into a single downloadable blob
///
/// The session owns no timer: the caller advances the duration on its own
/// clock via [`RecordingSession::update_recording_duration`] or
/// [`RecordingSession::advance`]. Who may record is also the caller's
/// decision; this type has no notion of identity.
pub struct RecordingSession {
    devices: Arc<dyn MediaDevices>,
    mime_type: String,
    inner: Mutex<Inner>,
    urls: ObjectUrls,
    changes: watch::Sender<RecordingState>,
}

impl RecordingSession {
    pub fn new(devices: Arc<dyn MediaDevices>, mime_type: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(RecordingState::default());
        Self {
            devices,
            mime_type: mime_type.into(),
            inner: Mutex::new(Inner {
                active: None,
                duration_ms: 0,
                url: None,
            }),
            urls: ObjectUrls::default(),
            changes,
        }
    }

    /// Start recording `stream`; the duration restarts from zero and the
    /// last finished recording's URL leaves the state
    pub fn start_recording(&self, stream: Option<&StreamView>) -> Result<(), RecordingError> {
        let stream = stream.ok_or(RecordingError::NoStream)?;

        let mut inner = self.inner.lock();
        if inner.active.is_some() {
            warn!("Recording already in progress");
            return Err(RecordingError::AlreadyRecording);
        }

        let handle = self.devices.create_recorder(stream, &self.mime_type)?;
        let mut active = Active {
            recorder: handle.recorder,
            chunk_rx: handle.chunks,
            chunks: Vec::new(),
        };
        active.recorder.start(RECORDER_TIMESLICE_MS)?;

        info!(
            "Recording started for stream {} ({})",
            stream.id(),
            active.recorder.mime_type()
        );
        inner.active = Some(active);
        inner.duration_ms = 0;
        // The previous URL stays valid until its owner revokes it
        inner.url = None;
        self.publish(&inner);
        Ok(())
    }

    /// Advance the duration by one clock tick
    pub fn update_recording_duration(&self) -> u64 {
        self.advance(DURATION_TICK_MS)
    }

    /// Advance the duration by `delta_ms`; ignored while not recording
    pub fn advance(&self, delta_ms: u64) -> u64 {
        let mut inner = self.inner.lock();
        match inner.active.as_mut() {
            // Keep the channel short on long recordings
            Some(active) => active.drain(),
            None => return inner.duration_ms,
        }

        inner.duration_ms = inner.duration_ms.saturating_add(delta_ms);
        self.publish(&inner);
        inner.duration_ms
    }

    /// Finish the recording and return an object URL for it
    ///
    /// Returns `None` if nothing was recording or the recorder failed to
    /// stop. The URL belongs to the caller, who must eventually pass it to
    /// [`RecordingSession::revoke_recording_url`].
    pub fn stop_recording(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let Some(mut active) = inner.active.take() else {
            warn!("stop_recording called with no active recording");
            return None;
        };

        let stopped = active.recorder.stop();
        active.drain();
        self.publish(&inner);

        if let Err(err) = stopped {
            error!("Failed to stop recorder: {}", err);
            return None;
        }

        let chunk_count = active.chunks.len();
        let blob = RecordingBlob::from_chunks(active.chunks, &self.mime_type);
        let size = blob.len();
        let url = self.urls.create(blob);

        info!(
            "Recording finished: {} chunks, {} bytes, {}ms -> {}",
            chunk_count, size, inner.duration_ms, url
        );
        inner.url = Some(url.clone());
        self.publish(&inner);
        Some(url)
    }

    /// Blob behind a URL returned by [`RecordingSession::stop_recording`]
    pub fn recording_blob(&self, url: &str) -> Option<RecordingBlob> {
        self.urls.get(url)
    }

    /// Release the blob behind `url`
    pub fn revoke_recording_url(&self, url: &str) -> bool {
        let revoked = self.urls.revoke(url);
        if revoked {
            let mut inner = self.inner.lock();
            if inner.url.as_deref() == Some(url) {
                inner.url = None;
                self.publish(&inner);
            }
        }
        revoked
    }

    /// Write the recording to `dir` under its download name
    pub fn save_recording(
        &self,
        url: &str,
        dir: impl AsRef<Path>,
        room_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let blob = self
            .urls
            .get(url)
            .with_context(|| format!("Unknown or revoked recording URL: {}", url))?;

        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create recordings directory")?;

        let path = dir.join(download_file_name(room_id, at));
        fs::write(&path, blob.data.as_slice())
            .with_context(|| format!("Failed to write recording: {:?}", path))?;

        info!("Saved recording to {} ({} bytes)", path.display(), blob.len());
        Ok(path)
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().active.is_some()
    }

    pub fn recording_duration_ms(&self) -> u64 {
        self.inner.lock().duration_ms
    }

    pub fn recording_url(&self) -> Option<String> {
        self.inner.lock().url.clone()
    }

    pub fn state(&self) -> RecordingState {
        self.inner.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordingState> {
        self.changes.subscribe()
    }

    fn publish(&self, inner: &Inner) {
        self.changes.send_replace(inner.snapshot());
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if let Some(mut active) = self.inner.get_mut().active.take() {
            if let Err(err) = active.recorder.stop() {
                warn!("Failed to stop recorder on drop: {}", err);
            }
        }
    }
}
