use super::entry::LogEntry;
use super::store::QueueStore;
use crate::backend::LocationBackend;
use crate::config::QueueConfig;
use crate::error::{Result, SitefenceError};
use crate::retry::{RetryClass, RetryExecutor};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Outcome of one drain attempt
#[derive(Debug, Default)]
pub struct SyncReport {
    pub delivered: usize,
    pub remaining: usize,
    /// Failure that stopped the drain, if any
    pub error: Option<SitefenceError>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.remaining == 0
    }
}

/// Bounded FIFO of location logs waiting for connectivity
pub struct OfflineLogQueue {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    store: Option<QueueStore>,
    persist_lock: tokio::sync::Mutex<()>,
    sync_lock: tokio::sync::Mutex<()>,
}

impl OfflineLogQueue {
    /// Open the queue backed by the configured file, restoring pending entries
    pub async fn open(config: &QueueConfig) -> Result<Self> {
        let store = QueueStore::new(config.path());
        let mut entries = store.load().await?;

        if entries.len() > config.capacity {
            let excess = entries.len() - config.capacity;
            warn!(
                "Queue file holds {} entries, dropping the oldest {} to fit capacity {}",
                entries.len(),
                excess,
                config.capacity
            );
            entries.drain(..excess);
        }

        Ok(Self {
            entries: Mutex::new(entries),
            capacity: config.capacity,
            store: Some(store),
            persist_lock: tokio::sync::Mutex::new(()),
            sync_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Queue that lives only as long as the process
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            store: None,
            persist_lock: tokio::sync::Mutex::new(()),
            sync_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the pending entries, oldest first
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Append an entry, evicting the oldest when full.
    ///
    /// Returns the evicted entry, if any.
    pub async fn enqueue(&self, entry: LogEntry) -> Result<Option<LogEntry>> {
        let evicted = {
            let mut entries = self.entries.lock();
            let evicted = if entries.len() >= self.capacity {
                entries.pop_front()
            } else {
                None
            };
            entries.push_back(entry);
            evicted
        };

        if let Some(old) = &evicted {
            warn!(
                "Offline queue full ({}), evicted {} entry {} from {}",
                self.capacity,
                old.kind(),
                old.id,
                old.created_at
            );
        }

        self.persist().await?;
        Ok(evicted)
    }

    pub async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        self.persist().await
    }

    /// Deliver queued entries in order until the queue is empty or a delivery fails.
    ///
    /// Only one drain runs at a time; a concurrent caller waits for it.
    pub async fn sync_all(
        &self,
        backend: &dyn LocationBackend,
        retry: &RetryExecutor,
    ) -> SyncReport {
        let _drain = self.sync_lock.lock().await;
        let mut report = SyncReport::default();

        loop {
            let Some(head) = self.entries.lock().front().cloned() else {
                break;
            };

            let entry = &head;
            let result = retry
                .execute_with_retry(RetryClass::Network, "queued location delivery", move || {
                    entry.deliver(backend)
                })
                .await;

            if let Err(e) = result {
                warn!(
                    "Delivery of queued {} entry {} failed, keeping it for the next sync: {}",
                    head.kind(),
                    head.id,
                    e
                );
                report.error = Some(e);
                break;
            }

            self.mark_synced(&head);
            report.delivered += 1;

            if let Err(e) = self.persist().await {
                report.error = Some(e);
                break;
            }
        }

        report.remaining = self.len();
        if report.delivered > 0 {
            info!(
                "Synced {} queued location logs, {} remaining",
                report.delivered, report.remaining
            );
        }
        report
    }

    fn mark_synced(&self, delivered: &LogEntry) {
        // The head may have been evicted by a concurrent enqueue during delivery
        self.entries.lock().retain(|e| e.id != delivered.id);
        debug!("Removed synced {} entry {}", delivered.kind(), delivered.id);
    }

    async fn persist(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let _write = self.persist_lock.lock().await;
        let entries = self.entries.lock().clone();
        store.save(&entries).await
    }
}
