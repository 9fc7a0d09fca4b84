use serde::{Deserialize, Serialize};

/// Which camera to prefer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front camera, facing the participant
    User,
    /// Rear camera
    Environment,
}

/// Video capture preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConstraints {
    /// Ideal frame width in pixels
    pub width: u32,
    /// Ideal frame height in pixels
    pub height: u32,
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            facing_mode: FacingMode::User,
        }
    }
}

/// Audio processing requested from the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// A capture request; `None` means that kind of media is not requested
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStreamConstraints {
    pub audio: Option<AudioConstraints>,
    pub video: Option<VideoConstraints>,
}

impl MediaStreamConstraints {
    /// Combined camera + microphone request used when joining a class
    pub fn classroom(audio: AudioConstraints, video: VideoConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: Some(video),
        }
    }

    pub fn video_only(video: VideoConstraints) -> Self {
        Self {
            audio: None,
            video: Some(video),
        }
    }

    pub fn audio_only(audio: AudioConstraints) -> Self {
        Self {
            audio: Some(audio),
            video: None,
        }
    }

    pub fn wants_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn wants_video(&self) -> bool {
        self.video.is_some()
    }
}

impl Default for MediaStreamConstraints {
    fn default() -> Self {
        Self::classroom(AudioConstraints::default(), VideoConstraints::default())
    }
}
