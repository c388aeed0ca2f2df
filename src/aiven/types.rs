//! Cache platform API types.

use serde::{Deserialize, Serialize};

/// A managed service.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Service {
    /// Service name.
    pub service_name: String,
    /// Service type (`valkey`, `redis`).
    pub service_type: String,
    /// Raw state.
    pub state: String,
    /// Connection URI.
    pub service_uri: String,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("service_name", &self.service_name)
            .field("service_type", &self.service_type)
            .field("state", &self.state)
            .field("has_uri", &!self.service_uri.is_empty())
            .finish()
    }
}

impl Service {
    /// Parsed state.
    #[must_use]
    pub fn parsed_state(&self) -> ServiceState {
        ServiceState::from_platform(&self.state)
    }
}

/// Service lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceState {
    /// Serving traffic.
    Running,
    /// Being built or restarted.
    Rebuilding,
    /// Powered off.
    PoweredOff,
    /// Failed.
    Failed,
    /// Any other value.
    Other(String),
}

impl ServiceState {
    /// Maps a platform state string.
    #[must_use]
    pub fn from_platform(state: &str) -> Self {
        match state.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "REBUILDING" | "RESTARTING" => Self::Rebuilding,
            "POWEROFF" | "POWERED_OFF" => Self::PoweredOff,
            "FAILED" => Self::Failed,
            _ => Self::Other(state.to_string()),
        }
    }
}

/// `{"service": {...}}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceEnvelope {
    /// The service.
    pub service: Service,
}

/// Body for service creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateServiceRequest {
    /// Cloud/region.
    pub cloud: String,
    /// Plan.
    pub plan: String,
    /// Service name.
    pub service_name: String,
    /// Service type.
    pub service_type: String,
}
