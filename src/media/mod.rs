pub mod constraints;
pub mod devices;
pub mod probe;
pub mod simulated;
pub mod track;

pub use constraints::{AudioConstraints, FacingMode, MediaStreamConstraints, VideoConstraints};
pub use devices::{
    AudioAnalyser, DeviceBackend, HeadlessDevices, MediaDevices, MediaDevicesFactory,
    MediaRecorder, RecorderHandle,
};
pub use probe::EnvironmentProbe;
pub use simulated::SimulatedDevices;
pub use track::{MediaKind, MediaStream, MediaTrack, ReadyState, StreamView, TrackInfo};
