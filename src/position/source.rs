use crate::error::PositionError;
use crate::location::Location;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outcome of a location permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    Unknown,
}

/// One item of a continuous watch: a fix, or a recoverable error
pub type PositionUpdate = Result<Location, PositionError>;

/// Identifies a running watch so it can be stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchHandle(u64);

impl WatchHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "watch-{}", self.0)
    }
}

/// A started watch. Errors arrive on the same stream as fixes and never end it.
#[derive(Debug)]
pub struct PositionWatch {
    pub handle: WatchHandle,
    pub updates: mpsc::UnboundedReceiver<PositionUpdate>,
}

/// Device positioning capability
#[async_trait::async_trait]
pub trait PositionSource: Send + Sync {
    /// Ask the platform for location access
    async fn request_permission(&self) -> Result<PermissionState, PositionError>;

    /// Single position read without any deadline
    async fn read_location(&self) -> Result<Location, PositionError>;

    /// Single position read bounded by `timeout`
    async fn current_location(&self, timeout: Duration) -> Result<Location, PositionError> {
        match tokio::time::timeout(timeout, self.read_location()).await {
            Ok(result) => result,
            Err(_) => Err(PositionError::Timeout { timeout }),
        }
    }

    /// Start a continuous stream of position updates
    fn watch(&self) -> Result<PositionWatch, PositionError>;

    /// Stop a watch. Stopping an unknown or already stopped handle is a no-op.
    fn stop_watch(&self, handle: WatchHandle);

    /// Name used in logs
    fn source_name(&self) -> &str {
        "position"
    }
}
