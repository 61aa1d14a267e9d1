mod filter;
mod simulated;
mod source;

pub use filter::AccuracyFilter;
pub use simulated::SimulatedPositionSource;
pub use source::{PermissionState, PositionSource, PositionUpdate, PositionWatch, WatchHandle};
