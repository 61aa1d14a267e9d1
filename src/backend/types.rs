use crate::error::Result;
use crate::location::{Location, ValidationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Query string of `GET /geofence/validate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub project_id: String,
    pub accuracy: f64,
}

impl GeofenceQuery {
    pub fn new(location: &Location, project_id: &str) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            project_id: project_id.to_string(),
            accuracy: location.accuracy_meters,
        }
    }
}

/// Server verdict for a geofence query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerValidation {
    pub inside_geofence: bool,
    pub distance: f64,
    pub can_start_tasks: bool,
}

impl ServerValidation {
    pub fn into_status(self) -> ValidationStatus {
        let mut status = ValidationStatus::measured(self.distance.max(0.0), self.inside_geofence);
        status.can_start_tasks = self.can_start_tasks;
        status
    }
}

/// Location snapshot embedded in a task-scoped log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<&Location> for LoggedLocation {
    fn from(location: &Location) -> Self {
        Self {
            latitude: location.latitude,
            longitude: location.longitude,
            accuracy: location.accuracy_meters,
            timestamp: location.timestamp,
        }
    }
}

/// Body of `POST /worker/location/log`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLocationLog {
    pub assignment_id: String,
    pub action: String,
    pub location: LoggedLocation,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Body of `POST /attendance/log-location`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralLocationLog {
    pub employee_id: String,
    pub project_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
    pub timestamp: DateTime<Utc>,
}

/// Network contract with the backend
#[async_trait::async_trait]
pub trait LocationBackend: Send + Sync {
    async fn validate_geofence(&self, query: &GeofenceQuery) -> Result<ServerValidation>;

    async fn log_task_location(&self, log: &TaskLocationLog) -> Result<()>;

    async fn log_general_location(&self, log: &GeneralLocationLog) -> Result<()>;
}
