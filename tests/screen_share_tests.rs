// Integration tests for screen sharing
//
// A share can be stopped from our own control or from the browser's
// sharing indicator; both must leave identical state behind.

use anyhow::Result;
use classroom_media::media::{MediaKind, SimulatedDevices};
use classroom_media::{CaptureError, DeviceError, ScreenShare, ScreenShareState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_start_and_stop_screen_share() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let share = ScreenShare::new(devices.clone());

    let state = share.start_screen_share().await?;
    assert!(state.is_screen_sharing);
    assert!(share.is_screen_sharing());

    let view = share.screen_stream().expect("display stream");
    assert_eq!(view.track_count(MediaKind::Video), 1);
    assert!(view.active());

    assert!(share.stop_screen_share());
    assert!(!share.is_screen_sharing());
    assert!(share.screen_stream().is_none());
    assert!(!view.active(), "display tracks stopped");

    Ok(())
}

#[tokio::test]
async fn test_stop_without_share_returns_false() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let share = ScreenShare::new(devices);

    assert!(!share.stop_screen_share());
    assert_eq!(share.state(), ScreenShareState::default());

    Ok(())
}

#[tokio::test]
async fn test_browser_stop_matches_explicit_stop() -> Result<()> {
    // Explicit stop
    let devices = Arc::new(SimulatedDevices::new());
    let explicit = ScreenShare::new(devices.clone());
    explicit.start_screen_share().await?;
    explicit.stop_screen_share();
    let explicit_state = explicit.state();

    // Native stop from the browser's sharing bar
    let devices = Arc::new(SimulatedDevices::new());
    let native = ScreenShare::new(devices.clone());
    let mut changes = native.subscribe();
    native.start_screen_share().await?;
    let view = native.screen_stream().expect("display stream");

    devices.stop_sharing_from_browser();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|s| !s.is_screen_sharing),
    )
    .await??;

    assert_eq!(native.state(), explicit_state);
    assert!(native.screen_stream().is_none());
    assert!(!view.active());
    assert!(!native.stop_screen_share(), "already torn down");

    Ok(())
}

#[tokio::test]
async fn test_share_again_after_browser_stop() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let share = ScreenShare::new(devices.clone());
    let mut changes = share.subscribe();

    let first = share.start_screen_share().await?;
    devices.stop_sharing_from_browser();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        changes.wait_for(|s| !s.is_screen_sharing),
    )
    .await??;

    let second = share.start_screen_share().await?;
    assert!(second.is_screen_sharing);
    assert_ne!(first.stream_id, second.stream_id);
    assert_eq!(devices.display_media_requests(), 2);

    Ok(())
}

#[tokio::test]
async fn test_start_while_sharing_is_a_no_op() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let share = ScreenShare::new(devices.clone());

    let first = share.start_screen_share().await?;
    let second = share.start_screen_share().await?;

    assert_eq!(first, second);
    assert_eq!(devices.display_media_requests(), 1);

    Ok(())
}

#[tokio::test]
async fn test_start_while_prompt_open_is_a_no_op() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    devices.hold_prompts();
    let share = Arc::new(ScreenShare::new(devices.clone()));

    let starting = Arc::clone(&share);
    let first = tokio::spawn(async move { starting.start_screen_share().await });

    tokio::time::timeout(Duration::from_secs(2), async {
        while devices.pending_prompts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    let second = share.start_screen_share().await?;
    assert!(!second.is_screen_sharing);

    devices.release_prompts();
    let first = first.await??;
    assert!(first.is_screen_sharing);
    assert_eq!(devices.display_media_requests(), 1);

    Ok(())
}

#[tokio::test]
async fn test_cancelled_picker_leaves_share_idle() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    devices.fail_next_display_media(DeviceError::permission_denied());
    let share = ScreenShare::new(devices.clone());

    let err = share.start_screen_share().await.unwrap_err();

    assert_eq!(err, CaptureError::PermissionDenied);
    assert!(!share.is_screen_sharing());

    // Picking a screen on the next try works
    assert!(share.start_screen_share().await?.is_screen_sharing);

    Ok(())
}

#[tokio::test]
async fn test_drop_stops_display_tracks() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    let view = {
        let share = ScreenShare::new(devices.clone());
        share.start_screen_share().await?;
        share.screen_stream().expect("display stream")
    };

    assert!(!view.active());

    Ok(())
}

#[tokio::test]
async fn test_cancelled_start_can_be_retried() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    devices.hold_prompts();
    let share = ScreenShare::new(devices.clone());

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), share.start_screen_share()).await;
    assert!(cancelled.is_err());
    assert_eq!(devices.pending_prompts(), 0);

    devices.release_prompts();
    let state = share.start_screen_share().await?;

    assert!(state.is_screen_sharing);
    assert_eq!(devices.display_media_requests(), 2);

    Ok(())
}

#[tokio::test]
async fn test_stop_while_picker_open_discards_share() -> Result<()> {
    let devices = Arc::new(SimulatedDevices::new());
    devices.hold_prompts();
    let share = Arc::new(ScreenShare::new(devices.clone()));

    let starting = Arc::clone(&share);
    let start = tokio::spawn(async move { starting.start_screen_share().await });
    tokio::time::timeout(Duration::from_secs(2), async {
        while devices.pending_prompts() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    assert!(!share.stop_screen_share(), "nothing was sharing yet");

    devices.release_prompts();
    let state = start.await??;

    assert!(!state.is_screen_sharing);
    assert!(!share.is_screen_sharing());
    assert!(share.screen_stream().is_none());

    assert!(share.start_screen_share().await?.is_screen_sharing);
    assert_eq!(devices.display_media_requests(), 2);

    Ok(())
}
