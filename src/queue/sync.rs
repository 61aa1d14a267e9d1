use super::offline::OfflineLogQueue;
use crate::backend::LocationBackend;
use crate::retry::RetryExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Background drain of the offline queue
pub struct QueueSyncWorker {
    queue: Arc<OfflineLogQueue>,
    backend: Arc<dyn LocationBackend>,
    retry: RetryExecutor,
    interval: Duration,
    reconnect: Arc<Notify>,
}

impl QueueSyncWorker {
    pub fn new(
        queue: Arc<OfflineLogQueue>,
        backend: Arc<dyn LocationBackend>,
        retry: RetryExecutor,
        interval: Duration,
        reconnect: Arc<Notify>,
    ) -> Self {
        Self {
            queue,
            backend,
            retry,
            interval,
            reconnect,
        }
    }

    /// Run until `cancel` fires, draining on every tick and every reconnect signal
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "Queue sync worker started ({}s interval)",
                self.interval.as_secs()
            );

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.reconnect.notified() => {
                        debug!("Reconnect signalled, draining offline queue");
                        self.drain().await;
                    }
                    _ = ticker.tick() => {
                        if !self.queue.is_empty() {
                            self.drain().await;
                        }
                    }
                }
            }

            info!("Queue sync worker stopped");
        })
    }

    async fn drain(&self) {
        let report = self.queue.sync_all(self.backend.as_ref(), &self.retry).await;
        if let Some(error) = &report.error {
            debug!(
                "Queue drain stopped with {} entries pending: {}",
                report.remaining, error
            );
        }
    }
}
