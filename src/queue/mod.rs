mod entry;
mod logger;
mod offline;
mod store;
mod sync;

pub use entry::{LogEntry, LogPayload};
pub use logger::{LocationLogger, LogOutcome};
pub use offline::{OfflineLogQueue, SyncReport};
pub use store::QueueStore;
pub use sync::QueueSyncWorker;
