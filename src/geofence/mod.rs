mod cache;
mod distance;
mod engine;
mod validator;

pub use cache::TtlCache;
pub use distance::{haversine_distance, EARTH_RADIUS_METERS};
pub use engine::{CacheKey, GeofenceEngine};
pub use validator::GeofenceValidator;
