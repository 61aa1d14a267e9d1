//! User-facing troubleshooting text for location failures

use crate::config::{SupportConfig, SupportContact};
use crate::error::{BackendError, PositionError, SitefenceError};
use crate::location::ValidationStatus;
use serde::Serialize;

/// Who to call when the steps do not help
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactReference {
    pub role: String,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl ContactReference {
    fn from_contact(role: &str, contact: &SupportContact) -> Self {
        Self {
            role: role.to_string(),
            name: contact.name.clone(),
            phone: Some(contact.phone.clone()),
            email: contact.email.clone(),
        }
    }

    fn administrator() -> Self {
        Self {
            role: "administrator".to_string(),
            name: "Contact your administrator".to_string(),
            phone: None,
            email: None,
        }
    }
}

/// Supervisor first, then site manager, then the generic fallback
pub fn support_contact(contacts: &SupportConfig) -> ContactReference {
    if let Some(supervisor) = &contacts.supervisor {
        return ContactReference::from_contact("supervisor", supervisor);
    }
    if let Some(manager) = &contacts.site_manager {
        return ContactReference::from_contact("site_manager", manager);
    }
    ContactReference::administrator()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TroubleshootingGuide {
    pub title: String,
    pub steps: Vec<String>,
    pub contact: ContactReference,
}

fn to_steps(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

pub fn troubleshooting_guide(error: &SitefenceError, contacts: &SupportConfig) -> TroubleshootingGuide {
    let (title, steps) = match error.root_cause() {
        SitefenceError::Position(PositionError::PermissionDenied) => (
            "Location access is blocked",
            to_steps(&[
                "Open the device settings for this app",
                "Allow location access while using the app",
                "Return to the app and try again",
            ]),
        ),
        SitefenceError::Position(PositionError::PositionUnavailable { .. }) => (
            "Your position could not be determined",
            to_steps(&[
                "Make sure location services are switched on",
                "Move outdoors or near a window for a clearer signal",
                "Wait a moment for the GPS to acquire a fix",
            ]),
        ),
        SitefenceError::Position(PositionError::Timeout { .. }) => (
            "Getting your location took too long",
            to_steps(&[
                "Check that high accuracy mode is enabled",
                "Move away from tall buildings or heavy cover",
                "Try again in a few seconds",
            ]),
        ),
        SitefenceError::Backend(BackendError::NoResponse { .. })
        | SitefenceError::Backend(BackendError::Status { .. }) => (
            "The server could not be reached",
            to_steps(&[
                "Check your mobile data or Wi-Fi connection",
                "Location logs are kept on the device and sent once you are back online",
                "Try the action again shortly",
            ]),
        ),
        SitefenceError::Validation { .. } => (
            "Your location could not be checked",
            to_steps(&[
                "Restart location services on the device",
                "Try the action again",
            ]),
        ),
        _ => (
            "Something went wrong",
            to_steps(&["Close and reopen the app", "Try the action again"]),
        ),
    };

    TroubleshootingGuide {
        title: title.to_string(),
        steps,
        contact: support_contact(contacts),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Info,
    Warning,
}

/// Banner shown alongside a validation result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserNotice {
    pub severity: NoticeSeverity,
    pub title: String,
    pub message: String,
    pub blocks_task_start: bool,
    pub contact: Option<ContactReference>,
}

/// Notice for `status`, or `None` when the worker is on site
pub fn status_notice(status: &ValidationStatus, contacts: &SupportConfig) -> Option<UserNotice> {
    if status.is_geofence_unavailable {
        return Some(UserNotice {
            severity: NoticeSeverity::Warning,
            title: "Site boundary not set".to_string(),
            message: status.message.clone(),
            blocks_task_start: true,
            contact: Some(support_contact(contacts)),
        });
    }

    if status.is_error() {
        return Some(UserNotice {
            severity: NoticeSeverity::Warning,
            title: "Location check failed".to_string(),
            message: status.message.clone(),
            blocks_task_start: true,
            contact: Some(support_contact(contacts)),
        });
    }

    if !status.is_within_geofence {
        return Some(UserNotice {
            severity: NoticeSeverity::Info,
            title: "Outside the project site".to_string(),
            message: status.message.clone(),
            blocks_task_start: false,
            contact: None,
        });
    }

    None
}
