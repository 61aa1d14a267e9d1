use crate::backend::{GeneralLocationLog, LocationBackend, LoggedLocation, TaskLocationLog};
use crate::error::Result;
use crate::location::Location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a log entry is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogPayload {
    /// Location recorded for an action on a task assignment
    Task {
        assignment_id: String,
        action: String,
        #[serde(default)]
        metadata: serde_json::Value,
    },
    /// Periodic attendance location
    General {
        employee_id: String,
        project_id: String,
    },
}

/// A location log waiting for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub payload: LogPayload,
    pub location: Location,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
}

impl LogEntry {
    pub fn new(payload: LogPayload, location: Location) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            location,
            created_at: Utc::now(),
            synced: false,
        }
    }

    pub fn task<A: Into<String>, B: Into<String>>(
        assignment_id: A,
        action: B,
        location: Location,
        metadata: serde_json::Value,
    ) -> Self {
        Self::new(
            LogPayload::Task {
                assignment_id: assignment_id.into(),
                action: action.into(),
                metadata,
            },
            location,
        )
    }

    pub fn general<A: Into<String>, B: Into<String>>(
        employee_id: A,
        project_id: B,
        location: Location,
    ) -> Self {
        Self::new(
            LogPayload::General {
                employee_id: employee_id.into(),
                project_id: project_id.into(),
            },
            location,
        )
    }

    pub fn kind(&self) -> &'static str {
        match self.payload {
            LogPayload::Task { .. } => "task",
            LogPayload::General { .. } => "general",
        }
    }

    /// Send this entry to the endpoint matching its kind
    pub async fn deliver(&self, backend: &dyn LocationBackend) -> Result<()> {
        match &self.payload {
            LogPayload::Task {
                assignment_id,
                action,
                metadata,
            } => {
                backend
                    .log_task_location(&TaskLocationLog {
                        assignment_id: assignment_id.clone(),
                        action: action.clone(),
                        location: LoggedLocation::from(&self.location),
                        metadata: metadata.clone(),
                    })
                    .await
            }
            LogPayload::General {
                employee_id,
                project_id,
            } => {
                backend
                    .log_general_location(&GeneralLocationLog {
                        employee_id: employee_id.clone(),
                        project_id: project_id.clone(),
                        latitude: self.location.latitude,
                        longitude: self.location.longitude,
                        accuracy: self.location.accuracy_meters,
                        timestamp: self.location.timestamp,
                    })
                    .await
            }
        }
    }
}
