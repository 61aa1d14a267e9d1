use super::entry::LogEntry;
use crate::error::{Result, SitefenceError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const QUEUE_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct QueueFile {
    version: u32,
    entries: VecDeque<LogEntry>,
}

#[derive(Serialize)]
struct QueueFileRef<'a> {
    version: u32,
    entries: &'a VecDeque<LogEntry>,
}

/// On-disk home of the offline queue
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Read the persisted entries; a missing file is an empty queue.
    ///
    /// A file that cannot be parsed, or carries an unknown version, is moved
    /// to `<path>.corrupt` and the queue starts empty.
    pub async fn load(&self) -> Result<VecDeque<LogEntry>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No queue file at {}", self.path.display());
                return Ok(VecDeque::new());
            }
            Err(e) => {
                return Err(SitefenceError::component(
                    "queue",
                    format!("Failed to read queue file {}: {}", self.path.display(), e),
                ))
            }
        };

        let problem = match serde_json::from_slice::<QueueFile>(&raw) {
            Ok(file) if file.version == QUEUE_FILE_VERSION => {
                info!(
                    "Loaded {} pending log entries from {}",
                    file.entries.len(),
                    self.path.display()
                );
                return Ok(file.entries);
            }
            Ok(file) => format!("unsupported version {}", file.version),
            Err(e) => e.to_string(),
        };

        let quarantine = self.sibling(".corrupt");
        warn!(
            "Queue file {} is unreadable ({}), moving it to {}",
            self.path.display(),
            problem,
            quarantine.display()
        );
        tokio::fs::rename(&self.path, &quarantine)
            .await
            .map_err(|e| {
                SitefenceError::component(
                    "queue",
                    format!("Failed to move aside corrupt queue file: {}", e),
                )
            })?;

        Ok(VecDeque::new())
    }

    /// Replace the file contents with `entries` via temp file and rename
    pub async fn save(&self, entries: &VecDeque<LogEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SitefenceError::component(
                    "queue",
                    format!("Failed to create queue directory: {}", e),
                )
            })?;
        }

        let body = serde_json::to_vec(&QueueFileRef {
            version: QUEUE_FILE_VERSION,
            entries,
        })?;

        let temp = self.sibling(".tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp)
            .await
            .map_err(|e| {
                SitefenceError::component("queue", format!("Failed to create queue file: {}", e))
            })?;

        file.write_all(&body).await.map_err(|e| {
            SitefenceError::component("queue", format!("Failed to write queue file: {}", e))
        })?;
        file.sync_all().await.map_err(|e| {
            SitefenceError::component("queue", format!("Failed to sync queue file: {}", e))
        })?;
        drop(file);

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            SitefenceError::component("queue", format!("Failed to replace queue file: {}", e))
        })?;

        debug!(
            "Persisted {} queue entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}
