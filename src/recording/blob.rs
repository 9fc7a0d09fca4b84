use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A finished recording held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingBlob {
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

impl RecordingBlob {
    /// Join recorder chunks in arrival order
    pub fn from_chunks(chunks: Vec<Vec<u8>>, mime_type: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: Arc::new(chunks.concat()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Object URLs handed out for finished recordings
///
/// A URL keeps its blob alive until the owner revokes it.
#[derive(Default)]
pub struct ObjectUrls {
    blobs: Mutex<HashMap<String, RecordingBlob>>,
}

impl ObjectUrls {
    pub fn create(&self, blob: RecordingBlob) -> String {
        let url = format!("blob:classroom/{}", uuid::Uuid::new_v4());
        self.blobs.lock().insert(url.clone(), blob);
        url
    }

    pub fn get(&self, url: &str) -> Option<RecordingBlob> {
        self.blobs.lock().get(url).cloned()
    }

    /// Drop the blob behind `url`; false if it was unknown or already revoked
    pub fn revoke(&self, url: &str) -> bool {
        self.blobs.lock().remove(url).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Download name: `classroom-recording-<room>-<YYYY-MM-DDTHH:MM:SS>.webm`
pub fn download_file_name(room_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "classroom-recording-{}-{}.webm",
        room_id,
        at.format("%Y-%m-%dT%H:%M:%S")
    )
}
