// Integration tests for recording
//
// Covers the recorder lifecycle, blob and object URL handling, saving to
// disk, and the teacher-only policy plus duration clock of the classroom.

use anyhow::Result;
use chrono::{TimeZone, Utc};
use classroom_media::media::{EnvironmentProbe, MediaStreamConstraints, SimulatedDevices};
use classroom_media::{
    CaptureSession, Classroom, ClassroomError, Config, DeviceError, RecordingError,
    RecordingSession, Role,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn connected(devices: &Arc<SimulatedDevices>) -> CaptureSession {
    let session = CaptureSession::new(
        devices.clone(),
        EnvironmentProbe::new(true, true),
        MediaStreamConstraints::default(),
    );
    session.join().await;
    session
}

fn recorder(devices: &Arc<SimulatedDevices>) -> RecordingSession {
    RecordingSession::new(devices.clone(), "video/webm")
}

#[tokio::test]
async fn test_start_without_stream_fails() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let recording = recorder(&devices);

    let err = recording.start_recording(None).unwrap_err();

    assert_eq!(err, RecordingError::NoStream);
    assert!(!recording.is_recording());
    assert_eq!(devices.recorders_created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_record_stream_to_blob() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);
    let stream = session.stream();

    recording.start_recording(stream.as_ref())?;
    assert!(recording.is_recording());
    assert_eq!(recording.recording_duration_ms(), 0);

    recording.update_recording_duration();
    recording.update_recording_duration();
    assert_eq!(recording.recording_duration_ms(), 2000);

    let url = recording.stop_recording().expect("recording url");
    assert!(url.starts_with("blob:"));
    assert!(!recording.is_recording());
    assert_eq!(recording.recording_url().as_deref(), Some(url.as_str()));
    assert_eq!(recording.recording_duration_ms(), 2000, "final duration kept");

    let blob = recording.recording_blob(&url).expect("blob");
    assert_eq!(blob.mime_type, "video/webm");
    let contents = String::from_utf8(blob.data.to_vec())?;
    assert!(contents.starts_with("header:video/webm:"));
    assert!(contents.ends_with("tracks:2;end"));

    Ok(())
}

#[tokio::test]
async fn test_duration_restarts_with_each_recording() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);

    recording.start_recording(session.stream().as_ref())?;
    recording.advance(5000);
    recording.stop_recording();
    assert_eq!(recording.recording_duration_ms(), 5000);

    recording.start_recording(session.stream().as_ref())?;
    assert_eq!(recording.recording_duration_ms(), 0);
    assert_eq!(recording.state().recording_duration_ms, 0);

    Ok(())
}

#[tokio::test]
async fn test_new_recording_clears_previous_url() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);

    recording.start_recording(session.stream().as_ref())?;
    let first = recording.stop_recording().expect("recording url");

    recording.start_recording(session.stream().as_ref())?;

    assert!(recording.recording_url().is_none());
    assert!(recording.state().recording_url.is_none());
    assert!(recording.recording_blob(&first).is_some(), "caller still owns it");

    let second = recording.stop_recording().expect("recording url");
    assert_ne!(first, second);
    assert_eq!(recording.recording_url(), Some(second));

    Ok(())
}

#[tokio::test]
async fn test_duration_ignores_ticks_when_idle() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let recording = recorder(&devices);

    assert_eq!(recording.update_recording_duration(), 0);
    assert_eq!(recording.advance(250), 0);

    Ok(())
}

#[tokio::test]
async fn test_second_start_is_rejected() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);

    recording.start_recording(session.stream().as_ref())?;
    let err = recording.start_recording(session.stream().as_ref()).unwrap_err();

    assert_eq!(err, RecordingError::AlreadyRecording);
    assert!(recording.is_recording());
    assert_eq!(devices.recorders_created(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_when_idle_returns_none() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let recording = recorder(&devices);

    assert!(recording.stop_recording().is_none());
    assert!(recording.recording_url().is_none());

    Ok(())
}

#[tokio::test]
async fn test_recorder_failure_leaves_session_idle() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);
    devices.fail_next_recorder(DeviceError::new("NotSupportedError", "No encoder"));

    let err = recording.start_recording(session.stream().as_ref()).unwrap_err();

    assert!(matches!(err, RecordingError::Recorder(_)));
    assert!(!recording.is_recording());

    Ok(())
}

#[tokio::test]
async fn test_ended_stream_cannot_be_recorded() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let stream = session.stream();
    session.leave();

    let recording = recorder(&devices);
    let err = recording.start_recording(stream.as_ref()).unwrap_err();

    assert!(matches!(err, RecordingError::Recorder(_)));
    assert!(!recording.is_recording());

    Ok(())
}

#[tokio::test]
async fn test_revoke_releases_blob() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);

    recording.start_recording(session.stream().as_ref())?;
    let url = recording.stop_recording().expect("recording url");

    assert!(recording.revoke_recording_url(&url));
    assert!(recording.recording_blob(&url).is_none());
    assert!(recording.recording_url().is_none());
    assert!(!recording.revoke_recording_url(&url), "second revoke is a no-op");

    Ok(())
}

#[tokio::test]
async fn test_save_recording_uses_download_name() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let devices = Arc::new(SimulatedDevices::new());
    let session = connected(&devices).await;
    let recording = recorder(&devices);

    recording.start_recording(session.stream().as_ref())?;
    let url = recording.stop_recording().expect("recording url");

    let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 5).unwrap();
    let path = recording.save_recording(&url, temp_dir.path().join("out"), "room-42", at)?;

    assert_eq!(
        path.file_name().and_then(|n| n.to_str()),
        Some("classroom-recording-room-42-2026-10-17T09:30:05.webm")
    );
    let blob = recording.recording_blob(&url).expect("blob");
    assert_eq!(std::fs::read(&path)?, blob.data.as_slice());

    recording.revoke_recording_url(&url);
    assert!(recording
        .save_recording(&url, temp_dir.path(), "room-42", at)
        .is_err());

    Ok(())
}

fn classroom(devices: &Arc<SimulatedDevices>, role: Role) -> Classroom {
    let mut config = Config::default();
    config.recording.tick_interval_ms = 10;
    Classroom::new(
        "room-1",
        role,
        devices.clone(),
        EnvironmentProbe::new(true, true),
        &config,
    )
}

#[tokio::test]
async fn test_only_teacher_can_record() -> Result<()> {
    for role in [Role::Student, Role::Parent, Role::Admin] {
        let devices = Arc::new(SimulatedDevices::new());
        let room = classroom(&devices, role);
        room.enter().await;

        let err = room.start_recording().unwrap_err();
        assert!(matches!(err, ClassroomError::NotAuthorized { .. }));
        assert!(!room.recording().is_recording());
        assert_eq!(devices.recorders_created(), 0);
    }

    Ok(())
}

#[tokio::test]
async fn test_teacher_must_be_connected_to_record() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let room = classroom(&devices, Role::Teacher);

    let err = room.start_recording().unwrap_err();

    assert_eq!(err, ClassroomError::Recording(RecordingError::NoStream));
    assert!(!room.recording().is_recording());

    Ok(())
}

#[tokio::test]
async fn test_classroom_clock_advances_duration() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let room = classroom(&devices, Role::Teacher);
    room.enter().await;
    let mut changes = room.recording().subscribe();

    let state = room.start_recording()?;
    assert!(state.is_recording);
    assert_eq!(state.recording_duration_ms, 0);

    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|s| s.recording_duration_ms >= 2000),
    )
    .await??;

    let url = room.stop_recording().expect("recording url");
    let stopped_at = room.recording().recording_duration_ms();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(room.recording().recording_duration_ms(), stopped_at, "clock stopped");
    assert!(room.recording().recording_blob(&url).is_some());

    Ok(())
}

#[tokio::test]
async fn test_close_releases_everything() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let room = classroom(&devices, Role::Teacher);
    room.preflight().run_camera_check().await;
    room.enter().await;
    room.start_screen_share().await?;
    room.start_recording()?;

    room.close();

    let snapshot = room.snapshot();
    assert!(!snapshot.capture.is_connected);
    assert!(!snapshot.screen_share.is_screen_sharing);
    assert!(!snapshot.recording.is_recording);
    assert!(snapshot.recording.recording_url.is_none());
    assert_eq!(devices.live_device_tracks(), 0);

    Ok(())
}
