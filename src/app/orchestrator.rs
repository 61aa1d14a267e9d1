use super::types::{ComponentState, ShutdownReason};
use crate::backend::{HttpBackend, LocationBackend};
use crate::config::SitefenceConfig;
use crate::coordinator::{CoordinatorConfig, ValidationCoordinator};
use crate::error::Result;
use crate::geofence::{GeofenceEngine, GeofenceValidator};
use crate::position::PositionSource;
use crate::queue::{LocationLogger, OfflineLogQueue, QueueSyncWorker};
use crate::retry::RetryExecutor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Top-level assembler: builds every service from configuration and owns
/// their lifecycle
pub struct SitefenceApp {
    pub(super) config: SitefenceConfig,
    pub(super) retry: RetryExecutor,
    pub(super) backend: Arc<dyn LocationBackend>,

    // Services
    pub(super) queue: Arc<OfflineLogQueue>,
    pub(super) logger: Arc<LocationLogger>,
    pub(super) coordinator: Arc<ValidationCoordinator>,
    pub(super) reconnect: Arc<Notify>,

    // Lifecycle management
    pub(super) component_states: Mutex<HashMap<String, ComponentState>>,
    pub(super) sync_task: Option<JoinHandle<()>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl SitefenceApp {
    /// Build the application talking to the configured HTTP backend
    pub async fn new(config: SitefenceConfig, source: Arc<dyn PositionSource>) -> Result<Self> {
        let backend: Arc<dyn LocationBackend> = Arc::new(HttpBackend::new(&config.backend)?);
        Self::with_backend(config, source, backend).await
    }

    /// Build the application around an existing backend client
    pub async fn with_backend(
        config: SitefenceConfig,
        source: Arc<dyn PositionSource>,
        backend: Arc<dyn LocationBackend>,
    ) -> Result<Self> {
        let retry = RetryExecutor::new(config.retry.clone());
        let reconnect = Arc::new(Notify::new());

        let queue = Arc::new(OfflineLogQueue::open(&config.queue).await.map_err(|e| {
            error!("Failed to open offline queue: {}", e);
            e
        })?);

        let logger = Arc::new(LocationLogger::new(
            Arc::clone(&backend),
            Arc::clone(&queue),
            retry.clone(),
            Arc::clone(&reconnect),
        ));

        let engine = GeofenceEngine::from_config(&config.validation);
        let validator = if config.validation.server_validation {
            GeofenceValidator::with_backend(engine, Arc::clone(&backend), retry.clone())
        } else {
            GeofenceValidator::local(engine)
        };

        let coordinator = Arc::new(ValidationCoordinator::new(
            CoordinatorConfig::from_config(&config),
            source,
            validator,
        ));

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        info!(
            "Sitefence assembled (backend {}, {} queued log entries)",
            config.backend.base_url,
            queue.len()
        );

        Ok(Self {
            config,
            retry,
            backend,
            queue,
            logger,
            coordinator,
            reconnect,
            component_states: Mutex::new(HashMap::new()),
            sync_task: None,
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start background work and prepare location services
    pub async fn start(&mut self) -> Result<()> {
        if self.sync_task.is_none() {
            self.set_component_state("queue_sync", ComponentState::Starting);
            let worker = QueueSyncWorker::new(
                Arc::clone(&self.queue),
                Arc::clone(&self.backend),
                self.retry.clone(),
                self.config.queue.sync_interval(),
                Arc::clone(&self.reconnect),
            );
            self.sync_task = Some(worker.spawn(self.cancellation_token.child_token()));
            self.set_component_state("queue_sync", ComponentState::Running);
        }

        self.set_component_state("coordinator", ComponentState::Starting);
        let geofence = self.config.site.as_ref().map(|site| site.geofence());
        match self.coordinator.initialize(geofence).await {
            Ok(permission) => {
                info!("Location services ready (permission {:?})", permission);
                self.set_component_state("coordinator", ComponentState::Running);
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize location services: {}", e);
                self.set_component_state("coordinator", ComponentState::Failed);
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &SitefenceConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<ValidationCoordinator> {
        &self.coordinator
    }

    pub fn logger(&self) -> &Arc<LocationLogger> {
        &self.logger
    }

    pub fn queue(&self) -> &Arc<OfflineLogQueue> {
        &self.queue
    }
}
