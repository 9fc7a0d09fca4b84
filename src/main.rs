use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use classroom_media::{
    create_router, AppState, Classroom, Config, EnvironmentProbe, MediaDevicesFactory, Role,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "classroom-media", version, about = "Local media sessions for the virtual classroom")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/classroom-media")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the classroom control API
    Serve,
    /// Walk one teacher through pre-flight, class and recording
    Demo {
        #[arg(long, default_value = "demo-room")]
        room: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Page origin: {}", cfg.environment.origin);
    info!("Device backend: {:?}", cfg.environment.backend);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Demo { room } => demo(cfg, &room).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let devices = MediaDevicesFactory::create(cfg.environment.backend)?;
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::new(devices, cfg));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app).await.context("HTTP server failed")?;
    Ok(())
}

async fn demo(cfg: Config, room: &str) -> Result<()> {
    let devices = MediaDevicesFactory::create(cfg.environment.backend)?;
    let probe = EnvironmentProbe::detect(&cfg.environment.origin, devices.as_ref());
    let classroom = Classroom::new(room, Role::Teacher, Arc::clone(&devices), probe, &cfg);

    let preflight = classroom.preflight();
    // Both checks prompt independently, so run them side by side
    futures::join!(preflight.run_camera_check(), preflight.run_mic_check());
    preflight.confirm_speaker();
    tokio::time::sleep(Duration::from_millis(cfg.preflight.audio_sample_interval_ms * 2)).await;
    let checks = preflight.state();
    info!(
        "Pre-flight: camera={:?} microphone={:?} (level {}) speaker={:?} all_passed={}",
        checks.camera.status,
        checks.microphone.status,
        checks.audio_level,
        checks.speaker.status,
        checks.all_passed()
    );

    let state = classroom.enter().await;
    if let Some(err) = state.error {
        info!("Could not join: {}", err);
        return Ok(());
    }
    info!("Joined: {:?}", classroom.capture().state());

    info!("Mic toggled: muted={}", classroom.capture().toggle_microphone().is_muted);
    info!("Camera toggled: off={}", classroom.capture().toggle_camera().is_camera_off);

    let share = classroom.start_screen_share().await?;
    info!("Screen share: {:?}", share);

    let recording = classroom.start_recording()?;
    info!("Recording: {:?}", recording);
    tokio::time::sleep(Duration::from_millis(cfg.recording.tick_interval_ms * 2 + 100)).await;

    if let Some(url) = classroom.stop_recording() {
        let dir = cfg.recording.recordings_dir()?;
        let path = classroom
            .recording()
            .save_recording(&url, dir, room, Utc::now())?;
        info!(
            "Recording saved to {} after {}ms",
            path.display(),
            classroom.recording().recording_duration_ms()
        );
        classroom.recording().revoke_recording_url(&url);
    }

    classroom.screen_share().stop_screen_share();
    classroom.leave();
    info!("Final state: {}", serde_json::to_string_pretty(&classroom.snapshot())?);

    Ok(())
}
