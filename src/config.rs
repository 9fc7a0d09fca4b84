use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

use crate::media::{AudioConstraints, DeviceBackend, VideoConstraints};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub environment: EnvironmentConfig,
    pub capture: CaptureConfig,
    pub preflight: PreflightConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "classroom-media".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Origin the classroom page is served from; decides the secure-context check
    pub origin: String,
    pub backend: DeviceBackend,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost".to_string(),
            backend: DeviceBackend::Simulated,
        }
    }
}

/// Constraints used when joining a class
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub video: VideoConstraints,
    pub audio: AudioConstraints,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// How often the microphone level meter is refreshed
    pub audio_sample_interval_ms: u64,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            audio_sample_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Cadence of the recording duration clock
    pub tick_interval_ms: u64,
    pub recordings_path: String,
    pub mime_type: String,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            recordings_path: "recordings".to_string(),
            mime_type: "video/webm".to_string(),
        }
    }
}

impl RecordingConfig {
    /// Recordings directory with `~` and environment variables expanded
    pub fn recordings_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.recordings_path)?;
        Ok(PathBuf::from(expanded.as_ref()))
    }
}

impl Config {
    /// Load from an optional config file plus `CLASSROOM__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CLASSROOM").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
