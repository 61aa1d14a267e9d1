mod service;
mod subscription;
#[cfg(test)]
mod tests;
mod types;
mod worker;

pub use service::ValidationCoordinator;
pub use subscription::Subscription;
pub use types::{CoordinatorConfig, CoordinatorState, ServiceStatus, StatusCallback};
