use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::status::{audio_level_from_bins, CheckStatus, PreflightState};
use crate::config::{CaptureConfig, PreflightConfig};
use crate::error::CaptureError;
use crate::media::{
    AudioAnalyser, AudioConstraints, MediaDevices, MediaKind, MediaStream,
    MediaStreamConstraints, StreamView, VideoConstraints,
};

struct Resources {
    state: PreflightState,
    camera_stream: Option<MediaStream>,
    mic_stream: Option<MediaStream>,
    analyser: Option<Arc<dyn AudioAnalyser>>,
    sampler: Option<JoinHandle<()>>,
    /// Bumped per check and by cleanup; stale results are discarded
    camera_attempt: u64,
    mic_attempt: u64,
}

struct Shared {
    devices: Arc<dyn MediaDevices>,
    video: VideoConstraints,
    audio: AudioConstraints,
    sample_interval: Duration,
    resources: Mutex<Resources>,
    changes: watch::Sender<PreflightState>,
}

impl Shared {
    fn publish(&self, resources: &Resources) -> PreflightState {
        self.changes.send_replace(resources.state.clone());
        resources.state.clone()
    }

    /// Take one level reading; `None` once the meter should stop
    fn sample(&self) -> Option<u8> {
        let mut resources = self.resources.lock();

        if !matches!(
            resources.state.microphone.status,
            CheckStatus::Checking | CheckStatus::Passed
        ) {
            return None;
        }
        let analyser = resources.analyser.as_ref()?;

        let level = audio_level_from_bins(&analyser.byte_frequency_data());
        if resources.state.audio_level != level {
            resources.state.audio_level = level;
            self.publish(&resources);
        }
        Some(level)
    }
}

#[derive(Debug, Clone, Copy)]
enum Device {
    Camera,
    Microphone,
}

impl Resources {
    fn attempt(&self, device: Device) -> u64 {
        match device {
            Device::Camera => self.camera_attempt,
            Device::Microphone => self.mic_attempt,
        }
    }

    /// A check with no request behind it any more goes back to idle
    fn settle_abandoned(&mut self, device: Device) {
        let check = match device {
            Device::Camera => &mut self.state.camera,
            Device::Microphone => &mut self.state.microphone,
        };
        if check.status == CheckStatus::Checking {
            check.status = CheckStatus::Idle;
        }
    }
}

/// Settles a check whose future is dropped at the permission prompt
struct PendingCheck<'a> {
    shared: &'a Shared,
    device: Device,
    attempt: u64,
    armed: bool,
}

impl PendingCheck<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingCheck<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut resources = self.shared.resources.lock();
        if resources.attempt(self.device) == self.attempt {
            warn!("{:?} check cancelled while waiting on the prompt", self.device);
            resources.settle_abandoned(self.device);
            self.shared.publish(&resources);
        }
    }
}

/// Device checks run before entering a class
///
/// Camera and microphone are verified by actually acquiring them; speakers
/// can only be confirmed by the user. Streams acquired here must be released
/// with [`PreflightCheck::cleanup`] before the capture session joins, or the
/// two acquisitions may fight over the same device.
pub struct PreflightCheck {
    shared: Arc<Shared>,
}

impl PreflightCheck {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        capture: &CaptureConfig,
        config: &PreflightConfig,
    ) -> Self {
        let (changes, _) = watch::channel(PreflightState::default());
        Self {
            shared: Arc::new(Shared {
                devices,
                video: capture.video.clone(),
                audio: capture.audio.clone(),
                sample_interval: Duration::from_millis(config.audio_sample_interval_ms.max(1)),
                resources: Mutex::new(Resources {
                    state: PreflightState::default(),
                    camera_stream: None,
                    mic_stream: None,
                    analyser: None,
                    sampler: None,
                    camera_attempt: 0,
                    mic_attempt: 0,
                }),
                changes,
            }),
        }
    }

    /// Acquire the camera alone and keep it for the preview tile
    pub async fn run_camera_check(&self) -> PreflightState {
        let attempt = {
            let mut resources = self.shared.resources.lock();
            if resources.state.camera.status == CheckStatus::Checking {
                debug!("Camera check already running");
                return resources.state.clone();
            }
            if let Some(stream) = resources.camera_stream.take() {
                stream.stop();
            }
            resources.camera_attempt += 1;
            resources.state.camera.start();
            self.shared.publish(&resources);
            resources.camera_attempt
        };

        info!("Running camera check");
        let constraints = MediaStreamConstraints::video_only(self.shared.video.clone());
        let pending = PendingCheck {
            shared: &self.shared,
            device: Device::Camera,
            attempt,
            armed: true,
        };
        let result = self.shared.devices.get_user_media(&constraints).await;
        pending.disarm();

        let mut resources = self.shared.resources.lock();
        if resources.camera_attempt != attempt {
            if let Ok(stream) = result {
                warn!("Discarding camera stream {} from a superseded check", stream.id());
                stream.stop();
            }
            resources.settle_abandoned(Device::Camera);
            return self.shared.publish(&resources);
        }

        match result {
            Ok(stream) => {
                info!("Camera check passed (stream {})", stream.id());
                resources.camera_stream = Some(stream);
                resources.state.camera.pass();
            }
            Err(err) => {
                let classified = CaptureError::from(&err);
                warn!("Camera check failed: {}", err);
                resources.state.camera.fail(classified.to_string());
            }
        }
        self.shared.publish(&resources)
    }

    /// Acquire the microphone alone and start the level meter
    pub async fn run_mic_check(&self) -> PreflightState {
        let attempt = {
            let mut resources = self.shared.resources.lock();
            if resources.state.microphone.status == CheckStatus::Checking {
                debug!("Microphone check already running");
                return resources.state.clone();
            }
            Self::release_microphone(&mut resources);
            resources.mic_attempt += 1;
            resources.state.microphone.start();
            resources.state.audio_level = 0;
            self.shared.publish(&resources);
            resources.mic_attempt
        };

        info!("Running microphone check");
        let constraints = MediaStreamConstraints::audio_only(self.shared.audio.clone());
        let pending = PendingCheck {
            shared: &self.shared,
            device: Device::Microphone,
            attempt,
            armed: true,
        };
        let result = self.shared.devices.get_user_media(&constraints).await;
        pending.disarm();

        let mut resources = self.shared.resources.lock();
        if resources.mic_attempt != attempt {
            if let Ok(stream) = result {
                warn!("Discarding microphone stream {} from a superseded check", stream.id());
                stream.stop();
            }
            resources.settle_abandoned(Device::Microphone);
            return self.shared.publish(&resources);
        }

        let stream = match result {
            Ok(stream) => stream,
            Err(err) => {
                let classified = CaptureError::from(&err);
                warn!("Microphone check failed: {}", err);
                resources.state.microphone.fail(classified.to_string());
                return self.shared.publish(&resources);
            }
        };

        let analyser = stream
            .first_track(MediaKind::Audio)
            .ok_or(CaptureError::DeviceNotFound)
            .and_then(|track| {
                self.shared
                    .devices
                    .create_analyser(track)
                    .map_err(|err| CaptureError::from(&err))
            });

        match analyser {
            Ok(analyser) => {
                info!("Microphone check passed (stream {})", stream.id());
                resources.mic_stream = Some(stream);
                resources.analyser = Some(analyser);
                resources.state.microphone.pass();
                resources.sampler = Some(Self::spawn_sampler(
                    Arc::downgrade(&self.shared),
                    self.shared.sample_interval,
                ));
            }
            Err(err) => {
                warn!("Microphone level meter unavailable: {:?}", err);
                stream.stop();
                resources.state.microphone.fail(err.to_string());
            }
        }
        self.shared.publish(&resources)
    }

    /// Record that the user heard the test sound
    pub fn confirm_speaker(&self) -> PreflightState {
        let mut resources = self.shared.resources.lock();
        resources.state.speaker.pass();
        info!("Speaker confirmed by user");
        self.shared.publish(&resources)
    }

    /// Take one microphone level reading now
    ///
    /// Returns `None` when no microphone check has passed or is running.
    pub fn sample_audio_level(&self) -> Option<u8> {
        self.shared.sample()
    }

    /// Release every device acquired by the checks
    ///
    /// Settled statuses are kept; a check still waiting on its prompt is
    /// abandoned and goes back to idle.
    pub fn cleanup(&self) {
        let mut resources = self.shared.resources.lock();

        resources.camera_attempt += 1;
        resources.mic_attempt += 1;
        resources.settle_abandoned(Device::Camera);
        resources.settle_abandoned(Device::Microphone);
        if let Some(stream) = resources.camera_stream.take() {
            stream.stop();
            info!("Released camera preview stream {}", stream.id());
        }
        Self::release_microphone(&mut resources);
        self.shared.publish(&resources);
    }

    pub fn all_passed(&self) -> bool {
        self.state().all_passed()
    }

    pub fn state(&self) -> PreflightState {
        self.shared.resources.lock().state.clone()
    }

    /// Read-only handle on the camera preview stream
    pub fn camera_preview(&self) -> Option<StreamView> {
        self.shared
            .resources
            .lock()
            .camera_stream
            .as_ref()
            .map(MediaStream::view)
    }

    pub fn microphone_stream(&self) -> Option<StreamView> {
        self.shared
            .resources
            .lock()
            .mic_stream
            .as_ref()
            .map(MediaStream::view)
    }

    pub fn subscribe(&self) -> watch::Receiver<PreflightState> {
        self.shared.changes.subscribe()
    }

    fn release_microphone(resources: &mut Resources) {
        if let Some(sampler) = resources.sampler.take() {
            sampler.abort();
        }
        resources.analyser = None;
        if let Some(stream) = resources.mic_stream.take() {
            stream.stop();
            info!("Released microphone check stream {}", stream.id());
        }
    }

    fn spawn_sampler(shared: Weak<Shared>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if shared.sample().is_none() {
                    debug!("Microphone level meter stopped");
                    break;
                }
            }
        })
    }
}

impl Drop for PreflightCheck {
    fn drop(&mut self) {
        self.cleanup();
    }
}
