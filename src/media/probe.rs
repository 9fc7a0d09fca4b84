use tracing::info;

use super::devices::MediaDevices;
use crate::error::CaptureError;

/// Preconditions for media capture, computed once per process
///
/// The page origin and the device API do not change during a session, so
/// the flags are fixed at construction and handed to every session that
/// needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentProbe {
    secure_context: bool,
    browser_supported: bool,
}

impl EnvironmentProbe {
    pub fn new(secure_context: bool, browser_supported: bool) -> Self {
        Self {
            secure_context,
            browser_supported,
        }
    }

    /// Evaluate the environment for the given page origin and backend
    pub fn detect(origin: &str, devices: &dyn MediaDevices) -> Self {
        let probe = Self::new(is_secure_origin(origin), devices.is_supported());
        info!(
            "Environment probe: origin={} secure={} supported={} backend={}",
            origin,
            probe.secure_context,
            probe.browser_supported,
            devices.name()
        );
        probe
    }

    pub fn is_secure_context(&self) -> bool {
        self.secure_context
    }

    pub fn is_browser_supported(&self) -> bool {
        self.browser_supported
    }

    /// Gate run before any hardware call; an insecure origin is reported first
    pub fn check(&self) -> Result<(), CaptureError> {
        if !self.secure_context {
            return Err(CaptureError::InsecureContext);
        }
        if !self.browser_supported {
            return Err(CaptureError::Unsupported);
        }
        Ok(())
    }
}

/// True for `https` origins and for loopback hosts on any scheme
fn is_secure_origin(origin: &str) -> bool {
    let (scheme, rest) = match origin.split_once("://") {
        Some(parts) => parts,
        None => return false,
    };

    if scheme.eq_ignore_ascii_case("https") {
        return true;
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = if authority.starts_with('[') {
        // IPv6 literal: keep the brackets, drop the port
        authority
            .find(']')
            .map(|end| &authority[..=end])
            .unwrap_or(authority)
    } else {
        authority.split(':').next().unwrap_or_default()
    };

    matches!(
        host.to_ascii_lowercase().as_str(),
        "localhost" | "127.0.0.1" | "[::1]"
    )
}
