use super::*;
use crate::backend::testing::ScriptedBackend;
use crate::backend::ServerValidation;
use crate::error::{PositionError, SitefenceError};
use crate::geofence::{GeofenceEngine, GeofenceValidator};
use crate::location::{Coordinates, Geofence, Location, ValidationStatus};
use crate::position::{AccuracyFilter, PermissionState, SimulatedPositionSource};
use crate::retry::RetryExecutor;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn site() -> Geofence {
    Geofence::new("tower-a", Coordinates::new(1.3521, 103.8198), 100.0)
}

fn at_site(accuracy_meters: f64) -> Location {
    Location::new(1.3521, 103.8198, accuracy_meters)
}

/// Roughly 1.1km north of the site centre
fn far_away() -> Location {
    Location::new(1.3621, 103.8198, 5.0)
}

fn test_config() -> CoordinatorConfig {
    // Only the immediate first tick fires during a real-time test
    config_with_interval(Duration::from_secs(3600))
}

fn config_with_interval(revalidation_interval: Duration) -> CoordinatorConfig {
    CoordinatorConfig {
        revalidation_interval,
        position_timeout: Duration::from_millis(200),
        filter: AccuracyFilter::new(50.0, 2.0),
    }
}

fn coordinator(source: &Arc<SimulatedPositionSource>) -> ValidationCoordinator {
    ValidationCoordinator::new(
        test_config(),
        source.clone(),
        GeofenceValidator::local(GeofenceEngine::default()),
    )
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<ValidationStatus>>>);

impl Recorder {
    fn callback(&self) -> impl Fn(&ValidationStatus) + Send + Sync + 'static {
        let statuses = Arc::clone(&self.0);
        move |status: &ValidationStatus| statuses.lock().push(status.clone())
    }

    fn all(&self) -> Vec<ValidationStatus> {
        self.0.lock().clone()
    }

    fn len(&self) -> usize {
        self.0.lock().len()
    }

    fn last(&self) -> Option<ValidationStatus> {
        self.0.lock().last().cloned()
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_last_unsubscribe_stops_watch_and_timer() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);

    let mut subscriptions = Vec::new();
    for _ in 0..3 {
        let recorder = Recorder::default();
        subscriptions.push(
            coordinator
                .start_real_time_validation(Some(site()), recorder.callback())
                .await
                .unwrap(),
        );
    }
    assert_eq!(source.active_watch_count(), 1);

    subscriptions[0].unsubscribe();
    subscriptions[1].unsubscribe();
    subscriptions[0].unsubscribe();

    let status = coordinator.get_service_status();
    assert_eq!(status.subscriber_count, 1);
    assert!(status.active);
    assert_eq!(source.active_watch_count(), 1);
    assert!(!subscriptions[0].is_active());
    assert!(subscriptions[2].is_active());

    subscriptions[2].unsubscribe();
    let status = coordinator.get_service_status();
    assert_eq!(status.subscriber_count, 0);
    assert!(!status.active);
    assert_eq!(source.active_watch_count(), 0);
}

#[tokio::test]
async fn test_coarse_sample_is_discarded() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);
    let known = coordinator.get_service_status().current_location;

    let mut coarse = far_away();
    coarse.accuracy_meters = 120.0;
    assert_eq!(source.push_location(coarse), 1);

    assert!(wait_until(|| coordinator.get_service_status().discarded_samples == 1).await);
    assert_eq!(recorder.len(), 1);
    assert_eq!(coordinator.get_service_status().current_location, known);

    source.push_location(far_away());
    assert!(wait_until(|| recorder.len() == 2).await);
    assert!(!recorder.last().unwrap().is_within_geofence);
}

#[tokio::test]
async fn test_panicking_subscriber_does_not_block_others() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _failing = coordinator
        .start_real_time_validation(Some(site()), |_| panic!("subscriber bug"))
        .await
        .unwrap();
    let _healthy = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();

    assert!(wait_until(|| recorder.len() >= 1).await);

    source.push_location(far_away());
    assert!(
        wait_until(|| recorder
            .last()
            .map(|status| !status.is_within_geofence)
            .unwrap_or(false))
        .await
    );
}

#[tokio::test]
async fn test_missing_geofence_reports_unavailable_immediately() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(None, recorder.callback())
        .await
        .unwrap();

    assert_eq!(recorder.len(), 1);
    let status = recorder.last().unwrap();
    assert!(status.is_geofence_unavailable);
    assert!(!status.can_start_tasks);
    assert_eq!(source.active_watch_count(), 0);
    assert_eq!(
        coordinator.get_service_status().state,
        CoordinatorState::Unavailable
    );

    coordinator.update_geofence(Some(site())).unwrap();
    assert_eq!(source.active_watch_count(), 1);
    assert!(
        wait_until(|| recorder
            .last()
            .map(|status| status.is_within_geofence)
            .unwrap_or(false))
        .await
    );
}

#[tokio::test]
async fn test_clearing_geofence_stops_watch_and_notifies() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);

    coordinator.update_geofence(None).unwrap();
    assert!(recorder.last().unwrap().is_geofence_unavailable);
    assert_eq!(source.active_watch_count(), 0);
    assert_eq!(coordinator.get_service_status().subscriber_count, 1);
}

#[tokio::test]
async fn test_geofence_update_triggers_revalidation() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);
    assert!(recorder.last().unwrap().is_within_geofence);

    let moved = Geofence::new("tower-a", Coordinates::new(1.3621, 103.8198), 100.0);
    coordinator.update_geofence(Some(moved)).unwrap();

    assert!(wait_until(|| recorder.len() == 2).await);
    let status = recorder.last().unwrap();
    assert!(!status.is_within_geofence);
    assert!(status.distance_meters > 1000.0);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_silences_callbacks() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);

    coordinator.stop_real_time_validation();
    coordinator.stop_real_time_validation();

    assert_eq!(source.push_location(far_away()), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), 1);

    let status = coordinator.get_service_status();
    assert_eq!(status.state, CoordinatorState::Stopped);
    assert_eq!(status.subscriber_count, 0);
    assert!(!status.active);
    assert!(!subscription.is_active());
}

#[tokio::test]
async fn test_unsubscribe_from_inside_callback() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let hits = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::default();

    let subscription = {
        let hits = Arc::clone(&hits);
        let slot = Arc::clone(&slot);
        coordinator
            .start_real_time_validation(Some(site()), move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = slot.lock().as_ref() {
                    subscription.unsubscribe();
                }
            })
            .await
            .unwrap()
    };
    assert!(wait_until(|| hits.load(Ordering::SeqCst) == 1).await);
    *slot.lock() = Some(subscription);

    source.push_location(far_away());
    assert!(wait_until(|| source.active_watch_count() == 0).await);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(coordinator.get_service_status().subscriber_count, 0);
}

#[tokio::test]
async fn test_late_subscriber_receives_last_status() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let first = Recorder::default();
    let second = Recorder::default();

    let _a = coordinator
        .start_real_time_validation(Some(site()), first.callback())
        .await
        .unwrap();
    assert!(wait_until(|| first.len() == 1).await);

    let _b = coordinator
        .start_real_time_validation(None, second.callback())
        .await
        .unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.last(), first.last());
}

#[tokio::test]
async fn test_timer_without_any_fix_reports_error() {
    let source = Arc::new(SimulatedPositionSource::new());
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();

    assert!(wait_until(|| recorder.len() == 1).await);
    let status = recorder.last().unwrap();
    assert!(status.is_error());
    assert!(!status.can_start_tasks);

    let service = coordinator.get_service_status();
    assert_eq!(service.state, CoordinatorState::Error);
    assert!(service.last_error.is_some());
    assert!(service.active);
}

#[tokio::test]
async fn test_watch_errors_are_counted_not_published() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);

    source.push_error(PositionError::PositionUnavailable {
        details: "signal lost".to_string(),
    });
    assert!(wait_until(|| coordinator.get_service_status().watch_errors == 1).await);
    assert_eq!(recorder.len(), 1);

    // Tracking survives the error
    source.push_location(far_away());
    assert!(wait_until(|| recorder.len() == 2).await);
}

#[tokio::test]
async fn test_on_demand_validation_updates_snapshot_only() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);

    assert_eq!(
        coordinator.initialize(Some(site())).await.unwrap(),
        PermissionState::Granted
    );
    assert_eq!(coordinator.get_service_status().state, CoordinatorState::Ready);

    let status = coordinator.validate_current_location().await.unwrap();
    assert!(status.is_within_geofence);
    assert_eq!(coordinator.get_current_validation_status(), Some(status));

    let service = coordinator.get_service_status();
    assert_eq!(service.state, CoordinatorState::Within);
    assert!(!service.active);
    assert_eq!(source.active_watch_count(), 0);
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let source = Arc::new(SimulatedPositionSource::new());
    let coordinator = coordinator(&source);

    coordinator.initialize(None).await.unwrap();
    coordinator.initialize(Some(site())).await.unwrap();
    assert_eq!(source.permission_requests(), 1);
    assert_eq!(
        coordinator.get_service_status().project_id.as_deref(),
        Some("tower-a")
    );
}

#[tokio::test]
async fn test_denied_permission_fails_start() {
    let source = Arc::new(SimulatedPositionSource::new().with_permission(PermissionState::Denied));
    let coordinator = coordinator(&source);

    let result = coordinator.initialize(Some(site())).await;
    assert!(matches!(
        result,
        Err(SitefenceError::Position(PositionError::PermissionDenied))
    ));

    let result = coordinator
        .start_real_time_validation(Some(site()), |_| {})
        .await;
    assert!(result.is_err());

    let service = coordinator.get_service_status();
    assert_eq!(service.permission, Some(PermissionState::Denied));
    assert_eq!(service.state, CoordinatorState::Error);
    assert_eq!(source.active_watch_count(), 0);
}

#[tokio::test]
async fn test_invalid_geofence_is_rejected() {
    let source = Arc::new(SimulatedPositionSource::new());
    let coordinator = coordinator(&source);

    let broken = Geofence::new("tower-a", Coordinates::new(1.0, 1.0), -5.0);
    assert!(coordinator.update_geofence(Some(broken)).is_err());
    assert!(coordinator.geofence().is_none());
}

#[tokio::test]
async fn test_geofence_change_during_slow_server_pass_is_revalidated() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let backend = Arc::new(ScriptedBackend::new());
    backend.delay_next_validation(Duration::from_millis(300));
    backend.push_validation(Ok(ServerValidation {
        inside_geofence: false,
        distance: 180.0,
        can_start_tasks: false,
    }));
    backend.set_default_validation(ServerValidation {
        inside_geofence: true,
        distance: 0.0,
        can_start_tasks: true,
    });

    let coordinator = ValidationCoordinator::new(
        test_config(),
        source.clone(),
        GeofenceValidator::with_backend(
            GeofenceEngine::default(),
            backend.clone(),
            RetryExecutor::default(),
        ),
    );
    let recorder = Recorder::default();
    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();

    // Widen the boundary while the first server answer is still in flight
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut wider = site();
    wider.radius_meters = 500.0;
    coordinator.update_geofence(Some(wider)).unwrap();

    assert!(wait_until(|| recorder.len() == 2).await);
    assert_eq!(backend.validate_calls(), 2);

    let statuses = recorder.all();
    assert!(!statuses[0].is_within_geofence);
    assert_eq!(statuses[0].distance_meters, 180.0);
    assert!(statuses[1].is_within_geofence);
}

#[tokio::test]
async fn test_on_demand_coarse_fix_does_not_replace_known_location() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);

    source.set_current_location(at_site(500.0));
    let status = coordinator.validate_current_location().await.unwrap();
    assert!(status.is_error());
    assert!(!status.can_start_tasks);

    let service = coordinator.get_service_status();
    assert_eq!(service.discarded_samples, 1);
    assert_eq!(service.current_location.unwrap().accuracy_meters, 5.0);
    assert_eq!(recorder.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_backup_timer_revalidates_without_watch_updates() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = ValidationCoordinator::new(
        config_with_interval(Duration::from_secs(30)),
        source.clone(),
        GeofenceValidator::local(GeofenceEngine::default()),
    );
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);
    assert!(recorder.last().unwrap().is_within_geofence);

    // The watch stays silent; only single reads see the worker walk away
    source.set_current_location(far_away());
    tokio::time::sleep(Duration::from_secs(65)).await;

    assert!(recorder.len() >= 3, "{} statuses", recorder.len());
    assert!(!recorder.last().unwrap().is_within_geofence);

    coordinator.stop_real_time_validation();
    let published = recorder.len();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(recorder.len(), published);
    assert_eq!(
        coordinator.get_service_status().state,
        CoordinatorState::Stopped
    );
}

#[tokio::test(start_paused = true)]
async fn test_queued_watch_update_is_handled_before_due_tick() {
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = ValidationCoordinator::new(
        config_with_interval(Duration::from_secs(30)),
        source.clone(),
        GeofenceValidator::local(GeofenceEngine::default()),
    );
    let recorder = Recorder::default();

    let _subscription = coordinator
        .start_real_time_validation(Some(site()), recorder.callback())
        .await
        .unwrap();
    assert!(wait_until(|| recorder.len() == 1).await);

    // Watch says outside, single reads still say inside
    assert_eq!(source.push_location(far_away()), 1);
    tokio::time::advance(Duration::from_secs(30)).await;

    assert!(wait_until(|| recorder.len() == 3).await);
    let statuses = recorder.all();
    assert!(!statuses[1].is_within_geofence);
    assert!(statuses[2].is_within_geofence);
}

#[test]
fn test_geofence_update_outside_runtime_is_an_error() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let source = Arc::new(SimulatedPositionSource::new().with_current_location(at_site(5.0)));
    let coordinator = coordinator(&source);
    let recorder = Recorder::default();

    let _subscription = runtime
        .block_on(coordinator.start_real_time_validation(None, recorder.callback()))
        .unwrap();
    assert_eq!(recorder.len(), 1);

    let result = coordinator.update_geofence(Some(site()));
    assert!(matches!(result, Err(SitefenceError::Component { .. })));
    assert_eq!(source.active_watch_count(), 0);
    assert!(!coordinator.get_service_status().active);
}
