use serde::{Deserialize, Serialize};

/// Progress of a single device check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Idle,
    Checking,
    Passed,
    Failed,
}

/// Result of checking one device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCheck {
    pub status: CheckStatus,
    pub error_message: Option<String>,
}

impl DeviceCheck {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }

    pub(crate) fn start(&mut self) {
        self.status = CheckStatus::Checking;
        self.error_message = None;
    }

    pub(crate) fn pass(&mut self) {
        self.status = CheckStatus::Passed;
        self.error_message = None;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.status = CheckStatus::Failed;
        self.error_message = Some(message);
    }
}

/// Observable state of the pre-flight screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreflightState {
    pub camera: DeviceCheck,
    pub microphone: DeviceCheck,
    pub speaker: DeviceCheck,

    /// Microphone input level, 0..=100
    pub audio_level: u8,
}

impl PreflightState {
    /// Camera and microphone verified; speakers cannot be probed and never block entry
    pub fn all_passed(&self) -> bool {
        self.camera.passed() && self.microphone.passed()
    }
}

/// Convert analyser frequency bins into a 0..=100 meter reading
///
/// The mean bin magnitude is scaled so that half of full scale already reads
/// as 100; normal speech rarely drives the bins much higher.
pub fn audio_level_from_bins(bins: &[u8]) -> u8 {
    if bins.is_empty() {
        return 0;
    }

    let sum: u32 = bins.iter().map(|&b| u32::from(b)).sum();
    let average = sum as f64 / bins.len() as f64;
    (average / 128.0 * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_level_scaling() {
        assert_eq!(audio_level_from_bins(&[]), 0);
        assert_eq!(audio_level_from_bins(&[0; 64]), 0);
        assert_eq!(audio_level_from_bins(&[64; 64]), 50);
        assert_eq!(audio_level_from_bins(&[128; 64]), 100);
        assert_eq!(audio_level_from_bins(&[255; 64]), 100, "clamped to full scale");
    }

    #[test]
    fn test_all_passed_ignores_speaker() {
        let mut state = PreflightState::default();
        assert!(!state.all_passed());

        state.camera.pass();
        assert!(!state.all_passed());

        state.microphone.pass();
        assert!(state.all_passed());

        state.speaker.fail("not confirmed".to_string());
        assert!(state.all_passed());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&CheckStatus::Passed).unwrap();
        assert_eq!(json, "\"passed\"");
    }
}
