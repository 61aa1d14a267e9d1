use super::{ComponentState, SitefenceApp};
use crate::error::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SYNC_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

impl SitefenceApp {
    /// Stop validation, cancel background work and try a last queue flush.
    ///
    /// Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");
        let mut exit_code = 0;

        self.set_component_state("coordinator", ComponentState::Stopping);
        self.coordinator.stop_real_time_validation();
        self.set_component_state("coordinator", ComponentState::Stopped);

        self.cancellation_token.cancel();

        if let Some(task) = self.sync_task.take() {
            self.set_component_state("queue_sync", ComponentState::Stopping);
            match timeout(SYNC_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => self.set_component_state("queue_sync", ComponentState::Stopped),
                Ok(Err(e)) => {
                    error!("Queue sync worker ended abnormally: {}", e);
                    self.set_component_state("queue_sync", ComponentState::Failed);
                    exit_code = 1;
                }
                Err(_) => {
                    error!("Queue sync worker stop timeout");
                    self.set_component_state("queue_sync", ComponentState::Failed);
                    exit_code = 1;
                }
            }
        }

        if !self.queue.is_empty() {
            info!("Flushing {} queued location logs", self.queue.len());
            match timeout(
                FLUSH_TIMEOUT,
                self.queue.sync_all(self.backend.as_ref(), &self.retry),
            )
            .await
            {
                Ok(report) if report.is_complete() => info!("Offline queue flushed"),
                Ok(report) => warn!(
                    "{} location logs stay queued on disk for the next run",
                    report.remaining
                ),
                Err(_) => warn!(
                    "Queue flush timed out, {} location logs stay queued",
                    self.queue.len()
                ),
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
