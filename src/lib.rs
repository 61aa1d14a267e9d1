pub mod app;
pub mod backend;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod geofence;
pub mod guidance;
pub mod location;
pub mod position;
pub mod queue;
pub mod retry;

pub use app::{ComponentState, ShutdownReason, SitefenceApp};
pub use backend::{HttpBackend, LocationBackend};
pub use config::SitefenceConfig;
pub use coordinator::{
    CoordinatorConfig, CoordinatorState, ServiceStatus, Subscription, ValidationCoordinator,
};
pub use error::{BackendError, PositionError, Result, SitefenceError};
pub use geofence::{haversine_distance, GeofenceEngine, GeofenceValidator, TtlCache};
pub use location::{Coordinates, Geofence, Location, ValidationStatus};
pub use position::{
    AccuracyFilter, PermissionState, PositionSource, PositionUpdate, PositionWatch,
    SimulatedPositionSource, WatchHandle,
};
pub use queue::{LocationLogger, LogEntry, LogOutcome, OfflineLogQueue, SyncReport};
pub use retry::{RetryClass, RetryConfig, RetryExecutor, RetryPolicy};
