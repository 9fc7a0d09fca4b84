//! Pre-join device checks (camera, microphone, speakers)

mod check;
mod status;

pub use check::PreflightCheck;
pub use status::{audio_level_from_bins, CheckStatus, DeviceCheck, PreflightState};
