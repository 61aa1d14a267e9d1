use super::engine::GeofenceEngine;
use crate::backend::{GeofenceQuery, LocationBackend};
use crate::location::{Geofence, Location, ValidationStatus};
use crate::retry::{RetryClass, RetryExecutor};
use std::sync::Arc;
use tracing::{debug, warn};

/// One full validation pass: cache, local check, optional server confirmation
pub struct GeofenceValidator {
    engine: GeofenceEngine,
    backend: Option<Arc<dyn LocationBackend>>,
    retry: RetryExecutor,
}

impl GeofenceValidator {
    /// Validator that never leaves the device
    pub fn local(engine: GeofenceEngine) -> Self {
        Self {
            engine,
            backend: None,
            retry: RetryExecutor::default(),
        }
    }

    /// Validator that confirms results with the backend
    pub fn with_backend(
        engine: GeofenceEngine,
        backend: Arc<dyn LocationBackend>,
        retry: RetryExecutor,
    ) -> Self {
        Self {
            engine,
            backend: Some(backend),
            retry,
        }
    }

    pub fn engine(&self) -> &GeofenceEngine {
        &self.engine
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub fn uses_server(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn validate(
        &self,
        location: &Location,
        geofence: Option<&Geofence>,
    ) -> ValidationStatus {
        let Some(geofence) = geofence else {
            return ValidationStatus::unavailable();
        };

        if let Some(status) = self.engine.cached(location, geofence) {
            debug!(
                "Reusing validation for project {} from cache",
                geofence.project_id
            );
            return status;
        }

        let local = self.engine.validate(location, Some(geofence));
        if local.is_error() {
            return local;
        }

        let status = match &self.backend {
            Some(backend) => {
                self.confirm_with_server(backend.as_ref(), location, geofence, local)
                    .await
            }
            None => local,
        };

        self.engine.store(location, geofence, &status);
        status
    }

    /// Forget cached results after a geofence change
    pub fn invalidate_project(&self, project_id: &str) {
        let dropped = self.engine.invalidate_project(project_id);
        if dropped > 0 {
            debug!(
                "Dropped {} cached validations for project {}",
                dropped, project_id
            );
        }
    }

    async fn confirm_with_server(
        &self,
        backend: &dyn LocationBackend,
        location: &Location,
        geofence: &Geofence,
        local: ValidationStatus,
    ) -> ValidationStatus {
        let query = GeofenceQuery::new(location, &geofence.project_id);
        let query = &query;

        let result = self
            .retry
            .execute_with_retry(RetryClass::Geofence, "server geofence validation", move || {
                backend.validate_geofence(query)
            })
            .await;

        match result {
            Ok(answer) => {
                if answer.inside_geofence != local.is_within_geofence {
                    debug!(
                        "Server disagrees with local check for project {} (server inside: {}, local {:.1}m)",
                        geofence.project_id, answer.inside_geofence, local.distance_meters
                    );
                }
                answer.into_status()
            }
            Err(e) => {
                warn!(
                    "Server validation unavailable for project {}, using local result: {}",
                    geofence.project_id, e
                );
                local
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{server_error, ScriptedBackend};
    use crate::backend::ServerValidation;
    use crate::location::Coordinates;
    use crate::retry::{RetryConfig, RetryPolicy};

    fn site() -> Geofence {
        Geofence::new("tower-a", Coordinates::new(1.3521, 103.8198), 100.0)
    }

    fn fast_retry() -> RetryExecutor {
        let mut config = RetryConfig::default();
        config.geofence = RetryPolicy::new(2, 10, 50, 2.0);
        RetryExecutor::new(config)
    }

    #[tokio::test]
    async fn test_server_answer_is_authoritative_and_cached() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_default_validation(ServerValidation {
            inside_geofence: false,
            distance: 180.0,
            can_start_tasks: false,
        });
        let validator =
            GeofenceValidator::with_backend(GeofenceEngine::default(), backend.clone(), fast_retry());

        let location = Location::new(1.3521, 103.8198, 5.0);
        let status = validator.validate(&location, Some(&site())).await;
        assert!(!status.is_within_geofence);
        assert_eq!(status.distance_meters, 180.0);
        assert_eq!(status.message, "You are 180m from the project site");

        // Second pass inside the cache window does not hit the network
        let again = validator.validate(&location, Some(&site())).await;
        assert_eq!(again, status);
        assert_eq!(backend.validate_calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_local_result_after_retries() {
        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_validation(Err(server_error(500)));
        }
        let validator =
            GeofenceValidator::with_backend(GeofenceEngine::default(), backend.clone(), fast_retry());

        let status = validator
            .validate(&Location::new(1.3521, 103.8198, 5.0), Some(&site()))
            .await;

        assert_eq!(backend.validate_calls(), 3);
        assert!(status.is_within_geofence);
        assert_eq!(status.distance_meters, 0.0);
    }

    #[tokio::test]
    async fn test_missing_geofence_skips_network() {
        let backend = Arc::new(ScriptedBackend::new());
        let validator =
            GeofenceValidator::with_backend(GeofenceEngine::default(), backend.clone(), fast_retry());

        let status = validator
            .validate(&Location::new(1.0, 1.0, 5.0), None)
            .await;

        assert!(status.is_geofence_unavailable);
        assert_eq!(backend.validate_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalidation_forces_recomputation() {
        let validator = GeofenceValidator::local(GeofenceEngine::default());
        let location = Location::new(1.3521, 103.8198, 5.0);

        let first = validator.validate(&location, Some(&site())).await;
        assert!(first.is_within_geofence);

        let mut moved = site();
        moved.center = Coordinates::new(1.36, 103.8198);
        validator.invalidate_project("tower-a");

        let second = validator.validate(&location, Some(&moved)).await;
        assert!(!second.is_within_geofence);
    }
}
