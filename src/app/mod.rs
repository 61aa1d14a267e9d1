mod orchestrator;
mod runtime;
mod shutdown;
mod state;
mod types;


pub use orchestrator::SitefenceApp;
pub use types::{ComponentState, ShutdownReason};
