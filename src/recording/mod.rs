//! Classroom recording
//!
//! Records a stream through the device backend's recorder, assembles the
//! chunks into one blob and hands it out under an object URL.

mod blob;
mod session;

pub use blob::{download_file_name, ObjectUrls, RecordingBlob};
pub use session::{RecordingSession, RecordingState, DURATION_TICK_MS};
