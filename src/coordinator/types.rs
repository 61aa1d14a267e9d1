use crate::config::SitefenceConfig;
use crate::location::{Location, ValidationStatus};
use crate::position::{AccuracyFilter, PermissionState};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with every published validation status
pub type StatusCallback = Arc<dyn Fn(&ValidationStatus) + Send + Sync>;

/// Lifecycle of the real-time validation loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Uninitialized,
    Ready,
    Validating,
    Within,
    Outside,
    Unavailable,
    Error,
    Stopped,
}

impl CoordinatorState {
    /// State reached after publishing `status`
    pub fn for_status(status: &ValidationStatus) -> Self {
        if status.is_geofence_unavailable {
            CoordinatorState::Unavailable
        } else if status.is_error() {
            CoordinatorState::Error
        } else if status.is_within_geofence {
            CoordinatorState::Within
        } else {
            CoordinatorState::Outside
        }
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoordinatorState::Uninitialized => "uninitialized",
            CoordinatorState::Ready => "ready",
            CoordinatorState::Validating => "validating",
            CoordinatorState::Within => "within",
            CoordinatorState::Outside => "outside",
            CoordinatorState::Unavailable => "unavailable",
            CoordinatorState::Error => "error",
            CoordinatorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Tunables of the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Period of the backup timer
    pub revalidation_interval: Duration,
    /// Deadline of one-shot position reads
    pub position_timeout: Duration,
    pub filter: AccuracyFilter,
}

impl CoordinatorConfig {
    pub fn from_config(config: &SitefenceConfig) -> Self {
        Self {
            revalidation_interval: config.validation.revalidation_interval(),
            position_timeout: config.position.timeout(),
            filter: AccuracyFilter::from_config(&config.position),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self::from_config(&SitefenceConfig::default())
    }
}

/// Read-only snapshot of the coordinator
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub state: CoordinatorState,
    pub initialized: bool,
    /// Whether the watch/timer loop is running
    pub active: bool,
    pub subscriber_count: usize,
    pub permission: Option<PermissionState>,
    pub project_id: Option<String>,
    pub current_location: Option<Location>,
    pub last_status: Option<ValidationStatus>,
    pub discarded_samples: u64,
    pub watch_errors: u64,
    pub last_error: Option<String>,
}
