use super::entry::LogEntry;
use super::offline::OfflineLogQueue;
use crate::backend::LocationBackend;
use crate::error::Result;
use crate::location::Location;
use crate::retry::{RetryClass, RetryExecutor};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Where a logged location ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Delivered,
    /// Stored for a later sync
    Queued,
}

/// Front door for location logging: live delivery first, offline queue on failure
pub struct LocationLogger {
    backend: Arc<dyn LocationBackend>,
    queue: Arc<OfflineLogQueue>,
    retry: RetryExecutor,
    reconnect: Arc<Notify>,
}

impl LocationLogger {
    pub fn new(
        backend: Arc<dyn LocationBackend>,
        queue: Arc<OfflineLogQueue>,
        retry: RetryExecutor,
        reconnect: Arc<Notify>,
    ) -> Self {
        Self {
            backend,
            queue,
            retry,
            reconnect,
        }
    }

    pub fn queue(&self) -> &Arc<OfflineLogQueue> {
        &self.queue
    }

    pub async fn log_task_location(
        &self,
        assignment_id: &str,
        action: &str,
        location: &Location,
        metadata: serde_json::Value,
    ) -> Result<LogOutcome> {
        location.validate()?;
        self.submit(LogEntry::task(assignment_id, action, location.clone(), metadata))
            .await
    }

    pub async fn log_general_location(
        &self,
        employee_id: &str,
        project_id: &str,
        location: &Location,
    ) -> Result<LogOutcome> {
        location.validate()?;
        self.submit(LogEntry::general(employee_id, project_id, location.clone()))
            .await
    }

    async fn submit(&self, entry: LogEntry) -> Result<LogOutcome> {
        let backend = self.backend.as_ref();
        let pending = &entry;
        let result = self
            .retry
            .execute_with_retry(RetryClass::Network, "location log delivery", move || {
                pending.deliver(backend)
            })
            .await;

        match result {
            Ok(()) => {
                debug!("Delivered {} location log {}", entry.kind(), entry.id);
                if !self.queue.is_empty() {
                    // Connectivity is back; let the sync worker drain the backlog
                    self.reconnect.notify_one();
                }
                Ok(LogOutcome::Delivered)
            }
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Could not deliver {} location log {}, queueing for later: {}",
                    entry.kind(),
                    entry.id,
                    e
                );
                self.queue.enqueue(entry).await?;
                info!("Offline queue now holds {} entries", self.queue.len());
                Ok(LogOutcome::Queued)
            }
            Err(e) => Err(e),
        }
    }
}
