use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitefenceError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last_error: Box<SitefenceError>,
    },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Errors raised by the device positioning capability
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable: {details}")]
    PositionUnavailable { details: String },

    #[error("Location request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Errors raised while talking to the backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The request never produced a response (connect failure, timeout, reset)
    #[error("No response from server: {details}")]
    NoResponse { details: String },

    #[error("Server responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to decode server response: {details}")]
    Decode { details: String },
}

impl SitefenceError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Number of attempts carried by a retry exhaustion error
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetryExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// The innermost error, unwrapping retry exhaustion
    pub fn root_cause(&self) -> &SitefenceError {
        match self {
            Self::RetryExhausted { last_error, .. } => last_error.root_cause(),
            other => other,
        }
    }

    /// Whether waiting and trying again could plausibly succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Position(error) => error.is_recoverable(),
            Self::Backend(error) => error.is_recoverable(),
            Self::Io(_) => true,
            Self::RetryExhausted { last_error, .. } => last_error.is_recoverable(),
            Self::Config(_)
            | Self::Json(_)
            | Self::Validation { .. }
            | Self::System { .. }
            | Self::Component { .. } => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self.root_cause() {
            Self::Position(error) => error.user_message(),
            Self::Backend(error) => error.user_message(),
            Self::Validation { .. } => {
                "Your location could not be checked against the project site".to_string()
            }
            Self::Config(_) => "The application is misconfigured".to_string(),
            _ => "Something went wrong while checking your location".to_string(),
        }
    }
}

impl PositionError {
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PositionError::PermissionDenied)
    }

    pub fn user_message(&self) -> String {
        match self {
            PositionError::PermissionDenied => {
                "Location access is turned off for this app".to_string()
            }
            PositionError::PositionUnavailable { .. } => {
                "Your position could not be determined".to_string()
            }
            PositionError::Timeout { .. } => "Getting your location took too long".to_string(),
        }
    }
}

impl BackendError {
    /// HTTP status code, when the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            BackendError::NoResponse { .. } => true,
            BackendError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            BackendError::Decode { .. } => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            BackendError::NoResponse { .. } => "The server could not be reached".to_string(),
            BackendError::Status { status, .. } if *status == 401 || *status == 403 => {
                "Your session is not authorised for this action".to_string()
            }
            BackendError::Status { .. } => "The server rejected the request".to_string(),
            BackendError::Decode { .. } => "The server sent an unexpected response".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SitefenceError>;
