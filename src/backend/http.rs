use super::types::{
    GeneralLocationLog, GeofenceQuery, LocationBackend, ServerValidation, TaskLocationLog,
};
use crate::config::BackendConfig;
use crate::error::{BackendError, Result, SitefenceError};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// JSON-over-HTTP implementation of the backend contract
pub struct HttpBackend {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| {
                SitefenceError::component("backend", format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            BackendError::NoResponse {
                details: e.to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        warn!("Backend responded with {}: {}", status, message);
        Err(BackendError::Status {
            status: status.as_u16(),
            message,
        }
        .into())
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await.map_err(|e| BackendError::NoResponse {
            details: format!("Failed to read response body: {}", e),
        })?;

        serde_json::from_str(&body).map_err(|e| {
            SitefenceError::from(BackendError::Decode {
                details: e.to_string(),
            })
        })
    }
}

#[async_trait::async_trait]
impl LocationBackend for HttpBackend {
    async fn validate_geofence(&self, query: &GeofenceQuery) -> Result<ServerValidation> {
        debug!(
            "Requesting server geofence validation for project {}",
            query.project_id
        );
        let request = self.client.get(self.url("geofence/validate")).query(query);
        let response = self.send(request).await?;
        Self::decode(response).await
    }

    async fn log_task_location(&self, log: &TaskLocationLog) -> Result<()> {
        debug!(
            "Logging task location for assignment {} ({})",
            log.assignment_id, log.action
        );
        let request = self.client.post(self.url("worker/location/log")).json(log);
        self.send(request).await?;
        Ok(())
    }

    async fn log_general_location(&self, log: &GeneralLocationLog) -> Result<()> {
        debug!(
            "Logging location for employee {} on project {}",
            log.employee_id, log.project_id
        );
        let request = self.client.post(self.url("attendance/log-location")).json(log);
        self.send(request).await?;
        Ok(())
    }
}
