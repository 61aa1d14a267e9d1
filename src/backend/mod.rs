mod http;
#[cfg(test)]
pub(crate) mod testing;
mod types;

pub use http::HttpBackend;
pub use types::{
    GeneralLocationLog, GeofenceQuery, LocationBackend, LoggedLocation, ServerValidation,
    TaskLocationLog,
};
