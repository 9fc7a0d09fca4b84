use crate::classroom::Classroom;
use crate::config::Config;
use crate::media::{EnvironmentProbe, MediaDevices};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Local participants by room (room_id → classroom)
    pub rooms: Arc<RwLock<HashMap<String, Arc<Classroom>>>>,

    /// Device backend shared by every room
    pub devices: Arc<dyn MediaDevices>,

    /// Capability probe, evaluated once at startup
    pub probe: EnvironmentProbe,

    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(devices: Arc<dyn MediaDevices>, config: Config) -> Self {
        let probe = EnvironmentProbe::detect(&config.environment.origin, devices.as_ref());
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            devices,
            probe,
            config: Arc::new(config),
        }
    }
}
