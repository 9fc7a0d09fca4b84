use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::constraints::MediaStreamConstraints;
use super::simulated::SimulatedDevices;
use super::track::{MediaStream, MediaTrack, StreamView};
use crate::error::DeviceError;

/// Frequency-domain view of a live audio track
///
/// Equivalent of an analyser node attached to the microphone: each call
/// returns the current magnitude per frequency bin, 0..=255.
pub trait AudioAnalyser: Send + Sync {
    fn byte_frequency_data(&self) -> Vec<u8>;
}

/// Encoder that turns a stream into container chunks
pub trait MediaRecorder: Send {
    /// Begin encoding; a chunk is emitted roughly every `timeslice_ms`
    fn start(&mut self, timeslice_ms: u64) -> Result<(), DeviceError>;

    /// Flush the final chunk and stop encoding
    fn stop(&mut self) -> Result<(), DeviceError>;

    fn mime_type(&self) -> &str;
}

/// A recorder plus the channel its data chunks arrive on
pub struct RecorderHandle {
    pub recorder: Box<dyn MediaRecorder>,
    pub chunks: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Media device access backend
///
/// Implementations:
/// - Simulated: scripted devices for the demo binary and tests
/// - Headless: a runtime with no media devices API at all
#[async_trait::async_trait]
pub trait MediaDevices: Send + Sync {
    /// Whether this runtime exposes device access at all
    fn is_supported(&self) -> bool;

    /// Prompt for camera and/or microphone access
    ///
    /// May stay pending for as long as the user leaves the permission prompt
    /// open; there is no way to cancel it.
    async fn get_user_media(
        &self,
        constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, DeviceError>;

    /// Prompt the user to pick a screen, window or tab to share
    async fn get_display_media(&self) -> Result<MediaStream, DeviceError>;

    /// Attach an analyser to an audio track
    fn create_analyser(&self, track: &MediaTrack) -> Result<Arc<dyn AudioAnalyser>, DeviceError>;

    /// Create a recorder for a stream
    fn create_recorder(
        &self,
        stream: &StreamView,
        mime_type: &str,
    ) -> Result<RecorderHandle, DeviceError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Device backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    #[default]
    Simulated,
    Headless,
}

/// Media devices factory
pub struct MediaDevicesFactory;

impl MediaDevicesFactory {
    pub fn create(backend: DeviceBackend) -> Result<Arc<dyn MediaDevices>> {
        match backend {
            DeviceBackend::Simulated => Ok(Arc::new(SimulatedDevices::new())),
            DeviceBackend::Headless => Ok(Arc::new(HeadlessDevices)),
        }
    }
}

/// Runtime without any media device API
pub struct HeadlessDevices;

impl HeadlessDevices {
    fn unsupported() -> DeviceError {
        DeviceError::new("NotSupportedError", "Media devices are not available")
    }
}

#[async_trait::async_trait]
impl MediaDevices for HeadlessDevices {
    fn is_supported(&self) -> bool {
        false
    }

    async fn get_user_media(
        &self,
        _constraints: &MediaStreamConstraints,
    ) -> Result<MediaStream, DeviceError> {
        Err(Self::unsupported())
    }

    async fn get_display_media(&self) -> Result<MediaStream, DeviceError> {
        Err(Self::unsupported())
    }

    fn create_analyser(&self, _track: &MediaTrack) -> Result<Arc<dyn AudioAnalyser>, DeviceError> {
        Err(Self::unsupported())
    }

    fn create_recorder(
        &self,
        _stream: &StreamView,
        _mime_type: &str,
    ) -> Result<RecorderHandle, DeviceError> {
        Err(Self::unsupported())
    }

    fn name(&self) -> &str {
        "headless"
    }
}
