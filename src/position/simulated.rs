use super::source::{PermissionState, PositionSource, PositionUpdate, PositionWatch, WatchHandle};
use crate::error::PositionError;
use crate::location::Location;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// In-process position source driven by explicit pushes.
///
/// Backs the replay mode of the binary and the test suites.
pub struct SimulatedPositionSource {
    state: Mutex<SimulatedState>,
    next_watch_id: AtomicU64,
    permission_requests: AtomicU64,
}

struct SimulatedState {
    permission: PermissionState,
    current: Result<Location, PositionError>,
    read_delay: Option<Duration>,
    watches: HashMap<u64, mpsc::UnboundedSender<PositionUpdate>>,
}

impl SimulatedPositionSource {
    /// Source with granted permission and no fix yet
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                permission: PermissionState::Granted,
                current: Err(PositionError::PositionUnavailable {
                    details: "no fix acquired yet".to_string(),
                }),
                read_delay: None,
                watches: HashMap::new(),
            }),
            next_watch_id: AtomicU64::new(1),
            permission_requests: AtomicU64::new(0),
        }
    }

    pub fn with_permission(self, permission: PermissionState) -> Self {
        self.set_permission(permission);
        self
    }

    pub fn with_current_location(self, location: Location) -> Self {
        self.set_current_location(location);
        self
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.state.lock().permission = permission;
    }

    /// Fix returned by single reads
    pub fn set_current_location(&self, location: Location) {
        self.state.lock().current = Ok(location);
    }

    /// Make single reads fail
    pub fn set_current_error(&self, error: PositionError) {
        self.state.lock().current = Err(error);
    }

    /// Delay applied to each single read
    pub fn set_read_delay(&self, delay: Option<Duration>) {
        self.state.lock().read_delay = delay;
    }

    /// Deliver a fix to every live watch; returns how many received it
    pub fn push_location(&self, location: Location) -> usize {
        self.broadcast(Ok(location))
    }

    /// Deliver an error to every live watch
    pub fn push_error(&self, error: PositionError) -> usize {
        self.broadcast(Err(error))
    }

    pub fn active_watch_count(&self) -> usize {
        self.state.lock().watches.len()
    }

    pub fn permission_requests(&self) -> u64 {
        self.permission_requests.load(Ordering::Relaxed)
    }

    /// Feed a recorded track into the live watches, one fix per `interval`
    pub async fn replay(&self, track: Vec<Location>, interval: Duration) {
        info!("Replaying {} recorded fixes every {:?}", track.len(), interval);
        let mut ticker = tokio::time::interval(interval);

        for location in track {
            ticker.tick().await;
            self.set_current_location(location.clone());
            let delivered = self.push_location(location);
            debug!("Replayed fix to {} watch(es)", delivered);
        }
    }

    fn broadcast(&self, update: PositionUpdate) -> usize {
        let mut state = self.state.lock();
        // Drop watches whose receivers went away
        state
            .watches
            .retain(|_, sender| sender.send(update.clone()).is_ok());
        state.watches.len()
    }
}

impl Default for SimulatedPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PositionSource for SimulatedPositionSource {
    async fn request_permission(&self) -> Result<PermissionState, PositionError> {
        self.permission_requests.fetch_add(1, Ordering::Relaxed);
        match self.state.lock().permission {
            PermissionState::Denied => Err(PositionError::PermissionDenied),
            other => Ok(other),
        }
    }

    async fn read_location(&self) -> Result<Location, PositionError> {
        let delay = self.state.lock().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        if state.permission == PermissionState::Denied {
            return Err(PositionError::PermissionDenied);
        }
        state.current.clone()
    }

    fn watch(&self) -> Result<PositionWatch, PositionError> {
        let mut state = self.state.lock();
        if state.permission == PermissionState::Denied {
            return Err(PositionError::PermissionDenied);
        }

        let id = self.next_watch_id.fetch_add(1, Ordering::Relaxed);
        let (sender, updates) = mpsc::unbounded_channel();
        state.watches.insert(id, sender);
        debug!("Started simulated watch {}", id);

        Ok(PositionWatch {
            handle: WatchHandle::new(id),
            updates,
        })
    }

    fn stop_watch(&self, handle: WatchHandle) {
        if self.state.lock().watches.remove(&handle.id()).is_some() {
            debug!("Stopped simulated {}", handle);
        }
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}
