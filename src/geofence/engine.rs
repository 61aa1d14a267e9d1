use super::cache::TtlCache;
use super::distance::haversine_distance;
use crate::config::ValidationConfig;
use crate::location::{Geofence, Location, ValidationStatus};
use std::time::Duration;
use tracing::{debug, warn};

/// Cache key: coordinates rounded to 6 decimals (~0.1m), the owning project
/// and the boundary the result was computed against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub latitude_e6: i64,
    pub longitude_e6: i64,
    pub project_id: String,
    pub center_latitude_e6: i64,
    pub center_longitude_e6: i64,
    /// Effective radius in millimeters
    pub radius_mm: i64,
}

impl CacheKey {
    pub fn new(location: &Location, geofence: &Geofence) -> Self {
        Self {
            latitude_e6: to_e6(location.latitude),
            longitude_e6: to_e6(location.longitude),
            project_id: geofence.project_id.clone(),
            center_latitude_e6: to_e6(geofence.center.latitude),
            center_longitude_e6: to_e6(geofence.center.longitude),
            radius_mm: (geofence.effective_radius() * 1e3).round() as i64,
        }
    }
}

fn to_e6(degrees: f64) -> i64 {
    (degrees * 1e6).round() as i64
}

/// Pure in/out computation with a short-lived result cache
pub struct GeofenceEngine {
    cache: TtlCache<CacheKey, ValidationStatus>,
}

impl GeofenceEngine {
    pub fn new(cache_ttl: Duration, purge_after: Duration) -> Self {
        Self {
            cache: TtlCache::new(cache_ttl, purge_after),
        }
    }

    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.cache_ttl(), config.cache_purge_after())
    }

    /// Compute the status of `location` against `geofence` without touching the cache
    pub fn validate(&self, location: &Location, geofence: Option<&Geofence>) -> ValidationStatus {
        let Some(geofence) = geofence else {
            debug!("No geofence configured, reporting site boundary as unavailable");
            return ValidationStatus::unavailable();
        };

        if let Err(e) = geofence.validate() {
            warn!("Geofence for project {} is invalid: {}", geofence.project_id, e);
            return ValidationStatus::error(e.to_string());
        }

        if let Err(e) = location.validate() {
            warn!("Rejecting location for validation: {}", e);
            return ValidationStatus::error(e.to_string());
        }

        let distance = haversine_distance(location.coordinates(), geofence.center);
        if !distance.is_finite() {
            return ValidationStatus::error(format!(
                "Distance computation produced a non-finite result for ({}, {})",
                location.latitude, location.longitude
            ));
        }

        let is_within = distance <= geofence.effective_radius();
        debug!(
            "Location is {:.1}m from project {} (effective radius {:.1}m, within: {})",
            distance,
            geofence.project_id,
            geofence.effective_radius(),
            is_within
        );

        ValidationStatus::measured(distance, is_within)
    }

    /// Cached status for this location and project, if still fresh
    pub fn cached(&self, location: &Location, geofence: &Geofence) -> Option<ValidationStatus> {
        self.cache.get(&CacheKey::new(location, geofence))
    }

    /// Remember a status. Error statuses are never cached.
    pub fn store(&self, location: &Location, geofence: &Geofence, status: &ValidationStatus) {
        if status.is_error() {
            return;
        }
        self.cache.insert(CacheKey::new(location, geofence), status.clone());
    }

    /// Cached status when fresh, otherwise compute and remember it
    pub fn validate_cached(
        &self,
        location: &Location,
        geofence: Option<&Geofence>,
    ) -> ValidationStatus {
        let Some(geofence) = geofence else {
            return ValidationStatus::unavailable();
        };

        if let Some(status) = self.cached(location, geofence) {
            debug!("Using cached validation for project {}", geofence.project_id);
            return status;
        }

        let status = self.validate(location, Some(geofence));
        self.store(location, geofence, &status);
        status
    }

    /// Forget every cached result for a project
    pub fn invalidate_project(&self, project_id: &str) -> usize {
        self.cache.invalidate_where(|key| key.project_id == project_id)
    }

    pub fn cache(&self) -> &TtlCache<CacheKey, ValidationStatus> {
        &self.cache
    }
}

impl Default for GeofenceEngine {
    fn default() -> Self {
        Self::from_config(&ValidationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Coordinates;

    fn site() -> Geofence {
        Geofence::new("tower-a", Coordinates::new(1.3521, 103.8198), 100.0)
    }

    /// Point roughly `meters` north of the site center
    fn north_of_center(meters: f64) -> Location {
        let degrees = meters / 111_194.93;
        Location::new(1.3521 + degrees, 103.8198, 5.0)
    }

    #[test]
    fn test_location_at_center_is_within() {
        let engine = GeofenceEngine::default();
        let status = engine.validate(&Location::new(1.3521, 103.8198, 5.0), Some(&site()));

        assert_eq!(status.distance_meters, 0.0);
        assert!(status.is_within_geofence);
        assert!(status.can_start_tasks);
        assert_eq!(status.message, "You are within the project site");
        assert!(!status.is_geofence_unavailable);
    }

    #[test]
    fn test_location_outside_radius() {
        let engine = GeofenceEngine::default();
        let status = engine.validate(&north_of_center(150.0), Some(&site()));

        assert!((status.distance_meters - 150.0).abs() < 1.0);
        assert!(!status.is_within_geofence);
        assert!(!status.can_start_tasks);
        assert_eq!(status.message, "You are 150m from the project site");
    }

    #[test]
    fn test_within_matches_distance_against_radius() {
        let engine = GeofenceEngine::default();
        for radius in [25.0, 80.0, 100.0, 140.0, 500.0] {
            let geofence = Geofence::new("p", Coordinates::new(1.3521, 103.8198), radius);
            for offset in [0.0, 10.0, 60.0, 99.0, 120.0, 300.0, 900.0] {
                let status = engine.validate(&north_of_center(offset), Some(&geofence));
                assert_eq!(
                    status.is_within_geofence,
                    status.distance_meters <= radius,
                    "radius {} offset {}",
                    radius,
                    offset
                );
                assert_eq!(status.can_start_tasks, status.is_within_geofence);
            }
        }
    }

    #[test]
    fn test_relaxed_geofence_applies_variance() {
        let engine = GeofenceEngine::default();
        let relaxed = site().with_variance(75.0);

        let status = engine.validate(&north_of_center(150.0), Some(&relaxed));
        assert!(status.is_within_geofence);

        let status = engine.validate(&north_of_center(190.0), Some(&relaxed));
        assert!(!status.is_within_geofence);
    }

    #[test]
    fn test_missing_geofence_is_unavailable() {
        let engine = GeofenceEngine::default();
        for location in [north_of_center(0.0), north_of_center(5_000.0)] {
            let status = engine.validate(&location, None);
            assert!(status.is_geofence_unavailable);
            assert!(!status.can_start_tasks);
            assert!(status.validation_error.is_none());
        }
    }

    #[test]
    fn test_invalid_location_reports_validation_error() {
        let engine = GeofenceEngine::default();
        let status = engine.validate(&Location::new(f64::NAN, 103.8, 5.0), Some(&site()));

        assert!(status.validation_error.is_some());
        assert!(!status.can_start_tasks);
        assert!(!status.is_geofence_unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_are_cached_per_rounded_coordinate() {
        let engine = GeofenceEngine::default();
        let location = north_of_center(150.0);

        let first = engine.validate_cached(&location, Some(&site()));
        assert_eq!(engine.cache().len(), 1);

        // Sub-micro-degree jitter maps to the same key
        let mut jittered = location.clone();
        jittered.latitude += 1e-8;
        let second = engine.validate_cached(&jittered, Some(&site()));
        assert_eq!(first.last_validation_time, second.last_validation_time);

        assert_eq!(engine.invalidate_project("tower-a"), 1);
        assert!(engine.cached(&location, &site()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_result_is_bound_to_its_boundary() {
        let engine = GeofenceEngine::default();
        let location = north_of_center(150.0);

        let outside = engine.validate_cached(&location, Some(&site()));
        assert!(!outside.is_within_geofence);

        // Same project, wider boundary: the old verdict must not be reused
        let mut wider = site();
        wider.radius_meters = 500.0;
        assert!(engine.cached(&location, &wider).is_none());
        assert!(engine.validate_cached(&location, Some(&wider)).is_within_geofence);
        assert_eq!(engine.cache().len(), 2);
    }
}
