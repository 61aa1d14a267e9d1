use crate::error::{Result, SitefenceError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check that both components are finite and inside their ranges
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(SitefenceError::validation(format!(
                "Coordinates must be finite (got {}, {})",
                self.latitude, self.longitude
            )));
        }

        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(SitefenceError::validation(format!(
                "Latitude {} is outside [-90, 90]",
                self.latitude
            )));
        }

        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(SitefenceError::validation(format!(
                "Longitude {} is outside [-180, 180]",
                self.longitude
            )));
        }

        Ok(())
    }
}

/// A single position fix produced by a position source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius in meters
    pub accuracy_meters: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Location {
    /// Create a fix taken now with no altitude, heading or speed
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            altitude: None,
            heading: None,
            speed_mps: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordinates().validate()?;

        if !(self.accuracy_meters >= 0.0) {
            return Err(SitefenceError::validation(format!(
                "Accuracy must be a non-negative number of meters (got {})",
                self.accuracy_meters
            )));
        }

        Ok(())
    }
}

/// Circular work-site boundary owned by a project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub project_id: String,
    pub center: Coordinates,
    pub radius_meters: f64,
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,
    #[serde(default)]
    pub allowed_variance_meters: f64,
}

fn default_strict_mode() -> bool {
    true
}

impl Geofence {
    /// Create a strict geofence with no variance tolerance
    pub fn new<S: Into<String>>(project_id: S, center: Coordinates, radius_meters: f64) -> Self {
        Self {
            project_id: project_id.into(),
            center,
            radius_meters,
            strict_mode: true,
            allowed_variance_meters: 0.0,
        }
    }

    /// Relax the boundary by `variance_meters` (disables strict mode)
    pub fn with_variance(mut self, variance_meters: f64) -> Self {
        self.strict_mode = false;
        self.allowed_variance_meters = variance_meters;
        self
    }

    /// Radius the in/out check compares against.
    ///
    /// Strict geofences use the plain radius; relaxed ones add the allowed variance.
    pub fn effective_radius(&self) -> f64 {
        if self.strict_mode {
            self.radius_meters
        } else {
            self.radius_meters + self.allowed_variance_meters
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.center.validate()?;

        if !(self.radius_meters > 0.0) || !self.radius_meters.is_finite() {
            return Err(SitefenceError::validation(format!(
                "Geofence radius must be greater than 0 (got {})",
                self.radius_meters
            )));
        }

        if !(self.allowed_variance_meters >= 0.0) || !self.allowed_variance_meters.is_finite() {
            return Err(SitefenceError::validation(format!(
                "Geofence variance must be non-negative (got {})",
                self.allowed_variance_meters
            )));
        }

        Ok(())
    }
}

/// Outcome of one validation pass. Recomputed on every pass, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStatus {
    pub is_within_geofence: bool,
    pub distance_meters: f64,
    pub can_start_tasks: bool,
    pub message: String,
    pub last_validation_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<String>,
    pub is_geofence_unavailable: bool,
}

impl ValidationStatus {
    /// Status for a measured distance against a boundary
    pub fn measured(distance_meters: f64, is_within_geofence: bool) -> Self {
        Self {
            is_within_geofence,
            distance_meters,
            can_start_tasks: is_within_geofence,
            message: distance_message(distance_meters, is_within_geofence),
            last_validation_time: Utc::now(),
            validation_error: None,
            is_geofence_unavailable: false,
        }
    }

    /// Status when the project has no geofence configured
    pub fn unavailable() -> Self {
        Self {
            is_within_geofence: false,
            distance_meters: 0.0,
            can_start_tasks: false,
            message: "Project site boundary is not configured. Task actions are disabled until \
                      a geofence is set for this project"
                .to_string(),
            last_validation_time: Utc::now(),
            validation_error: None,
            is_geofence_unavailable: true,
        }
    }

    /// Status when the check itself could not be carried out
    pub fn error<S: Into<String>>(error: S) -> Self {
        Self {
            is_within_geofence: false,
            distance_meters: 0.0,
            can_start_tasks: false,
            message: "Unable to verify your location against the project site".to_string(),
            last_validation_time: Utc::now(),
            validation_error: Some(error.into()),
            is_geofence_unavailable: false,
        }
    }

    pub fn is_error(&self) -> bool {
        self.validation_error.is_some()
    }
}

/// Human readable in/out message
pub fn distance_message(distance_meters: f64, is_within_geofence: bool) -> String {
    if is_within_geofence {
        "You are within the project site".to_string()
    } else {
        format!(
            "You are {}m from the project site",
            distance_meters.round() as i64
        )
    }
}
