use super::subscription::Subscription;
use super::types::{CoordinatorConfig, CoordinatorState, ServiceStatus, StatusCallback};
use super::worker::{self, Trigger};
use crate::error::{PositionError, Result, SitefenceError};
use crate::geofence::GeofenceValidator;
use crate::location::{Geofence, Location, ValidationStatus};
use crate::position::{PermissionState, PositionSource, WatchHandle};
use crate::retry::RetryClass;
use chrono::Utc;
use parking_lot::{Mutex, ReentrantMutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Subscriber {
    id: Uuid,
    callback: StatusCallback,
}

/// Running watch + timer loop
struct Worker {
    watch: Option<WatchHandle>,
    triggers: mpsc::UnboundedSender<Trigger>,
    cancel: CancellationToken,
    _task: JoinHandle<()>,
}

struct Shared {
    state: CoordinatorState,
    initialized: bool,
    permission: Option<PermissionState>,
    geofence: Option<Geofence>,
    current_location: Option<Location>,
    last_status: Option<ValidationStatus>,
    subscribers: Vec<Subscriber>,
    /// Bumped whenever a session ends; results of older sessions are dropped
    generation: u64,
    worker: Option<Worker>,
    last_error: Option<String>,
    discarded_samples: u64,
    watch_errors: u64,
}

pub(crate) struct Inner {
    config: CoordinatorConfig,
    source: Arc<dyn PositionSource>,
    validator: GeofenceValidator,
    shared: Mutex<Shared>,
    /// Held for the whole of a fan-out. Stop and unsubscribe take it too, so
    /// once they return no removed callback can still be running or about to run.
    delivery: ReentrantMutex<()>,
    /// One validation pass at a time
    pass_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    pub(super) fn has_subscriber(&self, id: Uuid) -> bool {
        self.shared.lock().subscribers.iter().any(|s| s.id == id)
    }

    pub(super) fn remove_subscriber(&self, id: Uuid) {
        let _gate = self.delivery.lock();
        let mut shared = self.shared.lock();

        let before = shared.subscribers.len();
        shared.subscribers.retain(|s| s.id != id);
        if shared.subscribers.len() == before {
            return;
        }
        debug!(
            "Subscriber {} removed ({} remaining)",
            id,
            shared.subscribers.len()
        );

        if shared.subscribers.is_empty() && shared.worker.is_some() {
            info!("Last subscriber left, stopping real-time validation");
            self.shutdown_worker(&mut shared);
            shared.state = CoordinatorState::Ready;
        }
    }

    fn add_subscriber(self: &Arc<Self>, callback: StatusCallback) -> Result<Subscription> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let _gate = self.delivery.lock();
        let mut shared = self.shared.lock();
        shared.subscribers.push(Subscriber {
            id,
            callback: Arc::clone(&callback),
        });
        info!(
            "Subscriber {} registered ({} active)",
            id,
            shared.subscribers.len()
        );

        let immediate = if shared.geofence.is_none() {
            let status = ValidationStatus::unavailable();
            shared.state = CoordinatorState::Unavailable;
            shared.last_status = Some(status.clone());
            Some(status)
        } else if shared.worker.is_none() {
            // The first tick of the new worker validates and fans out
            if let Err(e) = self.ensure_worker(&mut shared) {
                shared.subscribers.retain(|s| s.id != id);
                return Err(e);
            }
            None
        } else {
            shared.last_status.clone()
        };
        drop(shared);

        if let Some(status) = immediate {
            Self::deliver(id, &callback, &status);
        }

        Ok(Subscription::new(id, created_at, Arc::downgrade(self)))
    }

    /// Start watch and timer loop. Needs to run inside a Tokio runtime.
    fn ensure_worker(self: &Arc<Self>, shared: &mut Shared) -> Result<()> {
        if shared.worker.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SitefenceError::component(
                "coordinator",
                format!("Real-time validation needs a Tokio runtime: {}", e),
            )
        })?;

        let (watch, updates) = match self.source.watch() {
            Ok(watch) => (Some(watch.handle), Some(watch.updates)),
            Err(e) => {
                warn!(
                    "Could not start {} watch, relying on the revalidation timer: {}",
                    self.source.source_name(),
                    e
                );
                shared.watch_errors += 1;
                shared.last_error = Some(e.to_string());
                (None, None)
            }
        };

        shared.generation += 1;
        let generation = shared.generation;
        let cancel = CancellationToken::new();
        let (triggers, trigger_rx) = mpsc::unbounded_channel();

        let task = runtime.spawn(worker::run(
            Arc::downgrade(self),
            generation,
            updates,
            trigger_rx,
            cancel.clone(),
            self.config.revalidation_interval,
        ));

        info!(
            "Real-time validation started (session {}, {:?} revalidation)",
            generation, self.config.revalidation_interval
        );
        shared.worker = Some(Worker {
            watch,
            triggers,
            cancel,
            _task: task,
        });
        Ok(())
    }

    fn shutdown_worker(&self, shared: &mut Shared) {
        if let Some(worker) = shared.worker.take() {
            worker.cancel.cancel();
            if let Some(handle) = worker.watch {
                self.source.stop_watch(handle);
            }
            debug!("Validation worker of session {} cancelled", shared.generation);
        }
        shared.generation += 1;
    }

    /// Replace the session geofence and react if a session is running
    fn set_geofence(self: &Arc<Self>, geofence: Option<Geofence>) -> Result<()> {
        if let Some(geofence) = &geofence {
            geofence.validate()?;
        }

        let previous = {
            let mut shared = self.shared.lock();
            if shared.geofence == geofence {
                return Ok(());
            }
            std::mem::replace(&mut shared.geofence, geofence.clone())
        };

        for fence in previous.iter().chain(geofence.iter()) {
            self.validator.invalidate_project(&fence.project_id);
        }
        match &geofence {
            Some(fence) => info!(
                "Geofence set for project {} ({:.0}m effective radius)",
                fence.project_id,
                fence.effective_radius()
            ),
            None => info!("Geofence cleared"),
        }

        if geofence.is_some() {
            let mut shared = self.shared.lock();
            if shared.subscribers.is_empty() {
                return Ok(());
            }
            let running = shared.worker.as_ref().map(|w| w.triggers.clone());
            match running {
                Some(triggers) => {
                    if triggers.send(Trigger::GeofenceChanged).is_err() {
                        debug!("Validation worker already gone, geofence change not signalled");
                    }
                }
                None => self.ensure_worker(&mut shared)?,
            }
            return Ok(());
        }

        let _gate = self.delivery.lock();
        let generation = {
            let mut shared = self.shared.lock();
            if shared.subscribers.is_empty() {
                return Ok(());
            }
            self.shutdown_worker(&mut shared);
            shared.generation
        };
        self.publish(generation, ValidationStatus::unavailable());
        Ok(())
    }

    pub(super) async fn handle(&self, generation: u64, trigger: Trigger) {
        match trigger {
            Trigger::Update(Ok(location)) => {
                if !self.config.filter.accepts(&location) {
                    self.shared.lock().discarded_samples += 1;
                    return;
                }
                self.revalidate(generation, location).await;
            }
            Trigger::Update(Err(e)) => {
                warn!("Position watch reported an error, tracking continues: {}", e);
                let mut shared = self.shared.lock();
                shared.watch_errors += 1;
                shared.last_error = Some(e.to_string());
            }
            Trigger::Tick => self.revalidate_from_fix(generation).await,
            Trigger::GeofenceChanged => {
                let known = self.shared.lock().current_location.clone();
                match known {
                    Some(location) => self.revalidate(generation, location).await,
                    None => self.revalidate_from_fix(generation).await,
                }
            }
        }
    }

    /// Timer path: fresh one-shot read, falling back to the last accepted fix
    async fn revalidate_from_fix(&self, generation: u64) {
        let read = self
            .source
            .current_location(self.config.position_timeout)
            .await;

        let failure = match read {
            Ok(location) if self.config.filter.accepts(&location) => {
                self.revalidate(generation, location).await;
                return;
            }
            Ok(_) => {
                self.shared.lock().discarded_samples += 1;
                None
            }
            Err(e) => {
                debug!("Timer read failed: {}", e);
                self.shared.lock().last_error = Some(e.to_string());
                Some(e)
            }
        };

        let known = self.shared.lock().current_location.clone();
        match (known, failure) {
            (Some(location), _) => self.revalidate(generation, location).await,
            (None, Some(e)) => {
                warn!("No position available for validation: {}", e);
                self.publish(generation, ValidationStatus::error(e.to_string()));
            }
            (None, None) => debug!("Only coarse fixes so far, nothing to validate"),
        }
    }

    async fn revalidate(&self, generation: u64, location: Location) {
        let _pass = self.pass_lock.lock().await;

        let geofence = {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.current_location = Some(location.clone());
            shared.state = CoordinatorState::Validating;
            shared.geofence.clone()
        };

        let status = self.validator.validate(&location, geofence.as_ref()).await;
        debug!(
            "Validated ({:.5}, {:.5}) ±{:.0}m: {}",
            location.latitude, location.longitude, location.accuracy_meters, status.message
        );
        self.publish(generation, status);
    }

    /// Record `status` and hand it to every subscriber of `generation`
    fn publish(&self, generation: u64, status: ValidationStatus) {
        let _gate = self.delivery.lock();

        let ids: Vec<Uuid> = {
            let mut shared = self.shared.lock();
            if shared.generation != generation {
                debug!("Dropping status of ended session {}", generation);
                return;
            }
            shared.state = CoordinatorState::for_status(&status);
            shared.last_status = Some(status.clone());
            shared.subscribers.iter().map(|s| s.id).collect()
        };

        for id in ids {
            // A callback may have unsubscribed others or stopped the session
            let callback = {
                let shared = self.shared.lock();
                if shared.generation != generation {
                    break;
                }
                match shared.subscribers.iter().find(|s| s.id == id) {
                    Some(subscriber) => Arc::clone(&subscriber.callback),
                    None => continue,
                }
            };
            Self::deliver(id, &callback, &status);
        }
    }

    fn deliver(id: Uuid, callback: &StatusCallback, status: &ValidationStatus) {
        if catch_unwind(AssertUnwindSafe(|| callback(status))).is_err() {
            error!("Status callback of subscriber {} panicked", id);
        }
    }

    fn record_snapshot(&self, status: &ValidationStatus) {
        let mut shared = self.shared.lock();
        shared.state = CoordinatorState::for_status(status);
        shared.last_status = Some(status.clone());
    }

    fn record_failure(&self, error: &SitefenceError) {
        let mut shared = self.shared.lock();
        shared.state = CoordinatorState::Error;
        shared.last_error = Some(error.to_string());
    }
}

/// Keeps a worker's position validated against the project site and
/// pushes each result to every subscriber.
///
/// Owns the current geofence and location; callers only ever see snapshots.
pub struct ValidationCoordinator {
    inner: Arc<Inner>,
}

impl ValidationCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        source: Arc<dyn PositionSource>,
        validator: GeofenceValidator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                source,
                validator,
                shared: Mutex::new(Shared {
                    state: CoordinatorState::Uninitialized,
                    initialized: false,
                    permission: None,
                    geofence: None,
                    current_location: None,
                    last_status: None,
                    subscribers: Vec::new(),
                    generation: 0,
                    worker: None,
                    last_error: None,
                    discarded_samples: 0,
                    watch_errors: 0,
                }),
                delivery: ReentrantMutex::new(()),
                pass_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Store the geofence (when given) and obtain location permission.
    ///
    /// Permission is requested once; later calls return the stored answer.
    pub async fn initialize(&self, geofence: Option<Geofence>) -> Result<PermissionState> {
        if geofence.is_some() {
            self.inner.set_geofence(geofence)?;
        }

        let known = {
            let shared = self.inner.shared.lock();
            if shared.initialized {
                shared.permission
            } else {
                None
            }
        };
        if let Some(permission) = known {
            return Ok(permission);
        }

        let error = match self.inner.source.request_permission().await {
            Ok(PermissionState::Denied) => PositionError::PermissionDenied,
            Ok(permission) => {
                let mut shared = self.inner.shared.lock();
                shared.initialized = true;
                shared.permission = Some(permission);
                if shared.state == CoordinatorState::Uninitialized {
                    shared.state = CoordinatorState::Ready;
                }
                info!(
                    "Location services initialized via {} source (permission {:?})",
                    self.inner.source.source_name(),
                    permission
                );
                return Ok(permission);
            }
            Err(e) => e,
        };

        let error = SitefenceError::from(error);
        warn!("Location services unavailable: {}", error);
        if matches!(error, SitefenceError::Position(PositionError::PermissionDenied)) {
            self.inner.shared.lock().permission = Some(PermissionState::Denied);
        }
        self.inner.record_failure(&error);
        Err(error)
    }

    /// Register `callback` for every validation result.
    ///
    /// Starts the watch and backup timer when this is the first subscriber
    /// of a session with a geofence. Without a geofence the callback gets
    /// an unavailable status right away and no watch is started.
    pub async fn start_real_time_validation<F>(
        &self,
        geofence: Option<Geofence>,
        callback: F,
    ) -> Result<Subscription>
    where
        F: Fn(&ValidationStatus) + Send + Sync + 'static,
    {
        self.initialize(geofence).await?;
        self.inner.add_subscriber(Arc::new(callback))
    }

    /// Stop watch and timer and drop every subscriber. Idempotent.
    pub fn stop_real_time_validation(&self) {
        let _gate = self.inner.delivery.lock();
        let mut shared = self.inner.shared.lock();

        let was_running = shared.worker.is_some() || !shared.subscribers.is_empty();
        shared.subscribers.clear();
        self.inner.shutdown_worker(&mut shared);

        if was_running {
            shared.state = CoordinatorState::Stopped;
            info!("Real-time validation stopped");
        }
    }

    /// Replace the geofence; a running session revalidates immediately.
    ///
    /// Starting the watch for waiting subscribers needs a Tokio runtime;
    /// outside one this returns a component error.
    pub fn update_geofence(&self, geofence: Option<Geofence>) -> Result<()> {
        self.inner.set_geofence(geofence)
    }

    /// One-shot validation of a fresh fix, independent of the watch.
    ///
    /// Updates the snapshot but does not notify subscribers. A fix coarser
    /// than the accuracy filter allows yields an error status and leaves the
    /// last known location alone.
    pub async fn validate_current_location(&self) -> Result<ValidationStatus> {
        self.initialize(None).await?;

        let geofence = self.inner.shared.lock().geofence.clone();
        let Some(geofence) = geofence else {
            let status = ValidationStatus::unavailable();
            self.inner.record_snapshot(&status);
            return Ok(status);
        };

        let source = &self.inner.source;
        let timeout = self.inner.config.position_timeout;
        let location = self
            .inner
            .validator
            .retry()
            .execute_with_retry(RetryClass::Geofence, "current location read", move || async move {
                source
                    .current_location(timeout)
                    .await
                    .map_err(SitefenceError::from)
            })
            .await;

        let location = match location {
            Ok(location) => location,
            Err(e) => {
                self.inner.record_failure(&e);
                return Err(e);
            }
        };

        if !self.inner.config.filter.accepts(&location) {
            self.inner.shared.lock().discarded_samples += 1;
            return Ok(ValidationStatus::error(format!(
                "Position accuracy of {:.0}m is too coarse to validate",
                location.accuracy_meters
            )));
        }

        let _pass = self.inner.pass_lock.lock().await;
        self.inner.shared.lock().current_location = Some(location.clone());
        let status = self
            .inner
            .validator
            .validate(&location, Some(&geofence))
            .await;
        self.inner.record_snapshot(&status);
        Ok(status)
    }

    pub fn get_current_validation_status(&self) -> Option<ValidationStatus> {
        self.inner.shared.lock().last_status.clone()
    }

    pub fn get_service_status(&self) -> ServiceStatus {
        let shared = self.inner.shared.lock();
        ServiceStatus {
            state: shared.state,
            initialized: shared.initialized,
            active: shared.worker.is_some(),
            subscriber_count: shared.subscribers.len(),
            permission: shared.permission,
            project_id: shared.geofence.as_ref().map(|g| g.project_id.clone()),
            current_location: shared.current_location.clone(),
            last_status: shared.last_status.clone(),
            discarded_samples: shared.discarded_samples,
            watch_errors: shared.watch_errors,
            last_error: shared.last_error.clone(),
        }
    }

    pub fn geofence(&self) -> Option<Geofence> {
        self.inner.shared.lock().geofence.clone()
    }
}

impl Drop for ValidationCoordinator {
    fn drop(&mut self) {
        self.stop_real_time_validation();
    }
}
