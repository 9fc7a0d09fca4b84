use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Lifecycle of a track's source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// Source is producing media (possibly disabled)
    Live,
    /// Source is released and will never produce media again
    Ended,
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    enabled: AtomicBool,
    ready_state: watch::Sender<ReadyState>,
}

/// One audio or video channel of a media stream
///
/// Handles are cheap clones of the same underlying track, the way platform
/// track handles are. Only the session that acquired the track should call
/// [`MediaTrack::set_enabled`] or [`MediaTrack::stop`].
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: MediaKind, label: impl Into<String>) -> Self {
        let (ready_state, _) = watch::channel(ReadyState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                ready_state,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Mute or unmute the track without releasing its source
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready_state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.ready_state() == ReadyState::Live
    }

    /// Release the track's source
    pub fn stop(&self) {
        self.inner.ready_state.send_replace(ReadyState::Ended);
    }

    /// Called by device backends when the source ends on its own
    /// (device unplugged, user pressed the browser's "stop sharing" button)
    pub fn end_from_source(&self) {
        self.inner.ready_state.send_replace(ReadyState::Ended);
    }

    /// Resolves once the track has ended, whatever ended it
    pub async fn ended(&self) {
        let mut rx = self.inner.ready_state.subscribe();
        // The sender lives inside `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| *state == ReadyState::Ended).await;
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("enabled", &self.is_enabled())
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

/// A set of tracks acquired together
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == MediaKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == MediaKind::Video)
    }

    pub fn first_track(&self, kind: MediaKind) -> Option<&MediaTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    /// A stream is active while at least one of its tracks is live
    pub fn active(&self) -> bool {
        self.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track in the stream
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }

    /// Read-only handle for renderers
    pub fn view(&self) -> StreamView {
        StreamView {
            stream: self.clone(),
        }
    }
}

/// Per-track information exposed to observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: String,
    pub kind: MediaKind,
    pub label: String,
    pub enabled: bool,
    pub ready_state: ReadyState,
}

/// Read-only view of a stream owned by some session
///
/// Video tiles attach this for rendering. Stopping or muting goes through
/// the owning session.
#[derive(Debug, Clone)]
pub struct StreamView {
    stream: MediaStream,
}

impl StreamView {
    pub fn id(&self) -> &str {
        self.stream.id()
    }

    pub fn active(&self) -> bool {
        self.stream.active()
    }

    pub fn track_count(&self, kind: MediaKind) -> usize {
        self.stream.tracks().iter().filter(|t| t.kind() == kind).count()
    }

    /// Enabled flag of the first track of `kind`, if there is one
    pub fn first_enabled(&self, kind: MediaKind) -> Option<bool> {
        self.stream.first_track(kind).map(MediaTrack::is_enabled)
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.stream
            .tracks()
            .iter()
            .map(|t| TrackInfo {
                id: t.id().to_string(),
                kind: t.kind(),
                label: t.label().to_string(),
                enabled: t.is_enabled(),
                ready_state: t.ready_state(),
            })
            .collect()
    }

    /// Underlying stream, for device backends (recorders, analysers)
    pub(crate) fn stream(&self) -> &MediaStream {
        &self.stream
    }
}
