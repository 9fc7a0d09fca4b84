//! Deterministic in-process device backend
//!
//! Stands in for real camera, microphone and display capture. Tests script
//! it (queue failures, hold the permission prompt open, simulate the
//! browser's "stop sharing" button) and then inspect what it handed out.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::constraints::MediaStreamConstraints;
use super::devices::{AudioAnalyser, MediaDevices, MediaRecorder, RecorderHandle};
use super::track::{MediaKind, MediaStream, MediaTrack, StreamView};
use crate::error::DeviceError;

pub const CAMERA_LABEL: &str = "Simulated Camera";
pub const MICROPHONE_LABEL: &str = "Simulated Microphone";
pub const SCREEN_LABEL: &str = "Simulated Screen";

struct SimState {
    has_camera: bool,
    has_microphone: bool,
    exclusive_access: bool,
    user_media_failures: VecDeque<DeviceError>,
    display_media_failures: VecDeque<DeviceError>,
    recorder_failure: Option<DeviceError>,
    user_media_requests: usize,
    display_media_requests: usize,
    pending_prompts: usize,
    issued: Vec<MediaStream>,
    displays: Vec<MediaStream>,
    recorders_created: usize,
}

/// Scriptable media devices
pub struct SimulatedDevices {
    state: Mutex<SimState>,
    analyser_bins: Arc<Mutex<Vec<u8>>>,
    recorder_stop_failure: Arc<Mutex<Option<DeviceError>>>,
    prompts_held: watch::Sender<bool>,
}

/// Counts a prompt as open until the request finishes or is dropped
struct OpenPrompt<'a> {
    state: &'a Mutex<SimState>,
}

impl<'a> OpenPrompt<'a> {
    fn new(state: &'a Mutex<SimState>) -> Self {
        state.lock().pending_prompts += 1;
        Self { state }
    }
}

impl Drop for OpenPrompt<'_> {
    fn drop(&mut self) {
        self.state.lock().pending_prompts -= 1;
    }
}

impl SimulatedDevices {
    pub fn new() -> Self {
        let (prompts_held, _) = watch::channel(false);
        Self {
            state: Mutex::new(SimState {
                has_camera: true,
                has_microphone: true,
                exclusive_access: false,
                user_media_failures: VecDeque::new(),
                display_media_failures: VecDeque::new(),
                recorder_failure: None,
                user_media_requests: 0,
                display_media_requests: 0,
                pending_prompts: 0,
                issued: Vec::new(),
                displays: Vec::new(),
                recorders_created: 0,
            }),
            analyser_bins: Arc::new(Mutex::new(vec![64; 128])),
            recorder_stop_failure: Arc::new(Mutex::new(None)),
            prompts_held,
        }
    }

    /// Refuse a second acquisition of a camera/microphone that is still live
    pub fn with_exclusive_access(self) -> Self {
        self.state.lock().exclusive_access = true;
        self
    }

    pub fn without_camera(self) -> Self {
        self.state.lock().has_camera = false;
        self
    }

    pub fn without_microphone(self) -> Self {
        self.state.lock().has_microphone = false;
        self
    }

    /// Make the next camera/microphone request fail with `err`
    pub fn fail_next_user_media(&self, err: DeviceError) {
        self.state.lock().user_media_failures.push_back(err);
    }

    /// Make the next display capture request fail with `err`
    pub fn fail_next_display_media(&self, err: DeviceError) {
        self.state.lock().display_media_failures.push_back(err);
    }

    pub fn fail_next_recorder(&self, err: DeviceError) {
        self.state.lock().recorder_failure = Some(err);
    }

    /// Make the next recorder `stop` fail with `err`
    pub fn fail_next_recorder_stop(&self, err: DeviceError) {
        *self.recorder_stop_failure.lock() = Some(err);
    }

    /// Keep permission prompts open until [`Self::release_prompts`]
    pub fn hold_prompts(&self) {
        self.prompts_held.send_replace(true);
    }

    pub fn release_prompts(&self) {
        self.prompts_held.send_replace(false);
    }

    /// Set what every analyser reports as its frequency bins
    pub fn set_input_spectrum(&self, bins: Vec<u8>) {
        *self.analyser_bins.lock() = bins;
    }

    pub fn user_media_requests(&self) -> usize {
        self.state.lock().user_media_requests
    }

    pub fn display_media_requests(&self) -> usize {
        self.state.lock().display_media_requests
    }

    /// Prompts currently waiting on the user
    pub fn pending_prompts(&self) -> usize {
        self.state.lock().pending_prompts
    }

    pub fn recorders_created(&self) -> usize {
        self.state.lock().recorders_created
    }

    /// Camera/microphone streams handed out, in order
    ///
    /// Streams that had fully ended are forgotten whenever a new one is
    /// issued.
    pub fn issued_streams(&self) -> Vec<MediaStream> {
        self.state.lock().issued.clone()
    }

    /// Number of camera/microphone tracks that are still live
    pub fn live_device_tracks(&self) -> usize {
        self.state
            .lock()
            .issued
            .iter()
            .flat_map(|s| s.tracks().iter())
            .filter(|t| t.is_live())
            .count()
    }

    /// Simulate the browser's own "stop sharing" control for the latest share
    pub fn stop_sharing_from_browser(&self) {
        let state = self.state.lock();
        if let Some(stream) = state.displays.last() {
            info!("Simulating native stop sharing for stream {}", stream.id());
            for track in stream.tracks() {
                track.end_from_source();
            }
        }
    }

    async fn wait_for_prompt(&self) {
        let mut held = self.prompts_held.subscribe();
        let _open = OpenPrompt::new(&self.state);
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = held.wait_for(|held| !*held).await;
    }

    fn device_in_use(state: &SimState, label: &str) -> bool {
        state
            .issued
            .iter()
            .flat_map(|s| s.tracks().iter())
            .any(|t| t.label() == label && t.is_live())
    }
}

impl Default for SimulatedDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MediaDevices for SimulatedDevices {
    fn is_supported(&self) -> bool {
        true
    }

    async fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, DeviceError> {
        self.state.lock().user_media_requests += 1;
        self.wait_for_prompt().await;

        let mut state = self.state.lock();

        if let Some(err) = state.user_media_failures.pop_front() {
            debug!("Simulated getUserMedia failure: {}", err);
            return Err(err);
        }

        if (constraints.wants_video() && !state.has_camera)
            || (constraints.wants_audio() && !state.has_microphone)
        {
            return Err(DeviceError::not_found());
        }

        if state.exclusive_access
            && ((constraints.wants_video() && Self::device_in_use(&state, CAMERA_LABEL))
                || (constraints.wants_audio() && Self::device_in_use(&state, MICROPHONE_LABEL)))
        {
            return Err(DeviceError::busy());
        }

        let mut tracks = Vec::new();
        if constraints.wants_audio() {
            tracks.push(MediaTrack::new(MediaKind::Audio, MICROPHONE_LABEL));
        }
        if constraints.wants_video() {
            tracks.push(MediaTrack::new(MediaKind::Video, CAMERA_LABEL));
        }

        let stream = MediaStream::new(tracks);
        state.issued.retain(MediaStream::active);
        state.issued.push(stream.clone());
        Ok(stream)
    }

    async fn get_display_media(&self) -> Result<MediaStream, DeviceError> {
        self.state.lock().display_media_requests += 1;
        self.wait_for_prompt().await;

        let mut state = self.state.lock();

        if let Some(err) = state.display_media_failures.pop_front() {
            debug!("Simulated getDisplayMedia failure: {}", err);
            return Err(err);
        }

        let stream = MediaStream::new(vec![MediaTrack::new(MediaKind::Video, SCREEN_LABEL)]);
        state.displays.retain(MediaStream::active);
        state.displays.push(stream.clone());
        Ok(stream)
    }

    fn create_analyser(&self, track: &MediaTrack) -> Result<Arc<dyn AudioAnalyser>, DeviceError> {
        if track.kind() != MediaKind::Audio {
            return Err(DeviceError::new(
                "InvalidAccessError",
                "Analyser requires an audio track",
            ));
        }

        Ok(Arc::new(SimulatedAnalyser {
            bins: Arc::clone(&self.analyser_bins),
        }))
    }

    fn create_recorder(
        &self,
        stream: &StreamView,
        mime_type: &str,
    ) -> Result<RecorderHandle, DeviceError> {
        let mut state = self.state.lock();
        if let Some(err) = state.recorder_failure.take() {
            return Err(err);
        }
        state.recorders_created += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(RecorderHandle {
            recorder: Box::new(SimulatedRecorder {
                stream: stream.stream().clone(),
                mime_type: mime_type.to_string(),
                chunks: tx,
                recording: false,
                stop_failure: Arc::clone(&self.recorder_stop_failure),
            }),
            chunks: rx,
        })
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

struct SimulatedAnalyser {
    bins: Arc<Mutex<Vec<u8>>>,
}

impl AudioAnalyser for SimulatedAnalyser {
    fn byte_frequency_data(&self) -> Vec<u8> {
        self.bins.lock().clone()
    }
}

/// Emits a header chunk on start and a closing chunk on stop
struct SimulatedRecorder {
    stream: MediaStream,
    mime_type: String,
    chunks: mpsc::UnboundedSender<Vec<u8>>,
    recording: bool,
    stop_failure: Arc<Mutex<Option<DeviceError>>>,
}

impl MediaRecorder for SimulatedRecorder {
    fn start(&mut self, timeslice_ms: u64) -> Result<(), DeviceError> {
        if self.recording {
            return Err(DeviceError::new("InvalidStateError", "Recorder already started"));
        }
        if !self.stream.active() {
            return Err(DeviceError::new("InvalidStateError", "Stream is not active"));
        }

        debug!(
            "Simulated recorder started for stream {} ({}ms slices)",
            self.stream.id(),
            timeslice_ms
        );
        self.recording = true;
        let _ = self
            .chunks
            .send(format!("header:{}:{};", self.mime_type, self.stream.id()).into_bytes());
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if !self.recording {
            return Err(DeviceError::new("InvalidStateError", "Recorder is inactive"));
        }

        self.recording = false;
        if let Some(err) = self.stop_failure.lock().take() {
            return Err(err);
        }
        let _ = self
            .chunks
            .send(format!("tracks:{};end", self.stream.tracks().len()).into_bytes());
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}
