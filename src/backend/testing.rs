use super::types::{
    GeneralLocationLog, GeofenceQuery, LocationBackend, ServerValidation, TaskLocationLog,
};
use crate::error::{BackendError, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Backend double with scripted answers, recording what was delivered
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    state: Mutex<ScriptState>,
}

#[derive(Default)]
struct ScriptState {
    validations: VecDeque<std::result::Result<ServerValidation, BackendError>>,
    validation_delays: VecDeque<Duration>,
    default_validation: Option<ServerValidation>,
    log_failures: VecDeque<BackendError>,
    persistent_log_failure: Option<BackendError>,
    delivered: Vec<String>,
    validate_calls: usize,
    log_calls: usize,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer for the next validation request
    pub fn push_validation(&self, answer: std::result::Result<ServerValidation, BackendError>) {
        self.state.lock().validations.push_back(answer);
    }

    /// Hold the next validation request for `delay` before answering
    pub fn delay_next_validation(&self, delay: Duration) {
        self.state.lock().validation_delays.push_back(delay);
    }

    /// Answer once the scripted validations run out
    pub fn set_default_validation(&self, answer: ServerValidation) {
        self.state.lock().default_validation = Some(answer);
    }

    /// Fail the next `count` log deliveries
    pub fn fail_next_logs(&self, count: usize, error: BackendError) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.log_failures.push_back(error.clone());
        }
    }

    /// Fail every log delivery until cleared
    pub fn fail_all_logs(&self, error: Option<BackendError>) {
        self.state.lock().persistent_log_failure = error;
    }

    /// Assignment or employee ids of delivered logs, in delivery order
    pub fn delivered(&self) -> Vec<String> {
        self.state.lock().delivered.clone()
    }

    pub fn validate_calls(&self) -> usize {
        self.state.lock().validate_calls
    }

    pub fn log_calls(&self) -> usize {
        self.state.lock().log_calls
    }

    fn record_log(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.log_calls += 1;

        if let Some(error) = state.log_failures.pop_front() {
            return Err(error.into());
        }
        if let Some(error) = state.persistent_log_failure.clone() {
            return Err(error.into());
        }

        state.delivered.push(key.to_string());
        Ok(())
    }
}

pub(crate) fn server_error(status: u16) -> BackendError {
    BackendError::Status {
        status,
        message: "scripted failure".to_string(),
    }
}

pub(crate) fn no_response() -> BackendError {
    BackendError::NoResponse {
        details: "connection refused".to_string(),
    }
}

#[async_trait::async_trait]
impl LocationBackend for ScriptedBackend {
    async fn validate_geofence(&self, _query: &GeofenceQuery) -> Result<ServerValidation> {
        let delay = {
            let mut state = self.state.lock();
            state.validate_calls += 1;
            state.validation_delays.pop_front()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        match state.validations.pop_front() {
            Some(answer) => answer.map_err(Into::into),
            None => state
                .default_validation
                .clone()
                .ok_or_else(|| no_response().into()),
        }
    }

    async fn log_task_location(&self, log: &TaskLocationLog) -> Result<()> {
        self.record_log(&log.assignment_id)
    }

    async fn log_general_location(&self, log: &GeneralLocationLog) -> Result<()> {
        self.record_log(&log.employee_id)
    }
}
