use crate::location::{Coordinates, Geofence};
use crate::retry::RetryConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SitefenceConfig {
    #[serde(default)]
    pub position: PositionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub support: SupportConfig,
    /// Default work site used when no project record supplies one
    #[serde(default)]
    pub site: Option<SiteConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PositionConfig {
    /// Minimum useful accuracy in meters
    #[serde(default = "default_min_accuracy")]
    pub min_accuracy_meters: f64,

    /// Samples less accurate than `min_accuracy_meters * factor` are discarded
    #[serde(default = "default_accuracy_filter_factor")]
    pub accuracy_filter_factor: f64,

    /// Timeout for a single position read
    #[serde(default = "default_position_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ValidationConfig {
    /// Backup revalidation period while real-time validation runs
    #[serde(default = "default_revalidation_interval")]
    pub revalidation_interval_seconds: u64,

    /// How long a validation result is reused
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,

    /// Age after which cached results are dropped entirely
    #[serde(default = "default_cache_purge_after")]
    pub cache_purge_after_seconds: u64,

    /// Confirm local results with the backend
    #[serde(default = "default_server_validation")]
    pub server_validation: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QueueConfig {
    /// File the offline log queue persists to
    #[serde(default = "default_queue_path")]
    pub path: String,

    /// Maximum number of pending entries
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Period of the background sync attempt
    #[serde(default = "default_sync_interval")]
    pub sync_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackendConfig {
    /// API root, e.g. https://example.com/api
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Bearer token issued by the session layer
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SupportConfig {
    #[serde(default)]
    pub supervisor: Option<SupportContact>,
    #[serde(default)]
    pub site_manager: Option<SupportContact>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SupportContact {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SiteConfig {
    pub project_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
    #[serde(default = "default_site_strict_mode")]
    pub strict_mode: bool,
    #[serde(default)]
    pub allowed_variance_meters: f64,
}

impl SiteConfig {
    pub fn geofence(&self) -> Geofence {
        Geofence {
            project_id: self.project_id.clone(),
            center: Coordinates::new(self.latitude, self.longitude),
            radius_meters: self.radius_meters,
            strict_mode: self.strict_mode,
            allowed_variance_meters: self.allowed_variance_meters,
        }
    }
}

impl PositionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Accuracy above which samples are dropped
    pub fn discard_threshold_meters(&self) -> f64 {
        self.min_accuracy_meters * self.accuracy_filter_factor
    }
}

impl ValidationConfig {
    pub fn revalidation_interval(&self) -> Duration {
        Duration::from_secs(self.revalidation_interval_seconds)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn cache_purge_after(&self) -> Duration {
        Duration::from_secs(self.cache_purge_after_seconds)
    }
}

impl QueueConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_seconds)
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl SitefenceConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sitefence.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&SitefenceConfig::default())?)
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. SITEFENCE_BACKEND__BASE_URL
            .add_source(
                Environment::with_prefix("SITEFENCE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: SitefenceConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.position.min_accuracy_meters > 0.0) {
            return Err(ConfigError::Message(
                "Position min_accuracy_meters must be greater than 0".to_string(),
            ));
        }

        if !(self.position.accuracy_filter_factor >= 1.0) {
            return Err(ConfigError::Message(
                "Position accuracy_filter_factor must be at least 1.0".to_string(),
            ));
        }

        if self.position.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Position timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.validation.revalidation_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Validation revalidation_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.validation.cache_ttl_seconds == 0 {
            return Err(ConfigError::Message(
                "Validation cache_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.validation.cache_purge_after_seconds < self.validation.cache_ttl_seconds {
            return Err(ConfigError::Message(
                "Validation cache_purge_after_seconds must not be shorter than cache_ttl_seconds"
                    .to_string(),
            ));
        }

        for (name, policy) in [
            ("network", &self.retry.network),
            ("api", &self.retry.api),
            ("auth", &self.retry.auth),
            ("geofence", &self.retry.geofence),
            ("data_load", &self.retry.data_load),
        ] {
            policy
                .validate()
                .map_err(|e| ConfigError::Message(format!("Retry policy '{}': {}", name, e)))?;
        }

        if self.queue.capacity == 0 {
            return Err(ConfigError::Message(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.queue.sync_interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Queue sync_interval_seconds must be greater than 0".to_string(),
            ));
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "Backend base_url must not be empty".to_string(),
            ));
        }

        if let Some(site) = &self.site {
            site.geofence()
                .validate()
                .map_err(|e| ConfigError::Message(format!("Site geofence: {}", e)))?;
        }

        Ok(())
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            min_accuracy_meters: default_min_accuracy(),
            accuracy_filter_factor: default_accuracy_filter_factor(),
            timeout_seconds: default_position_timeout(),
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            revalidation_interval_seconds: default_revalidation_interval(),
            cache_ttl_seconds: default_cache_ttl(),
            cache_purge_after_seconds: default_cache_purge_after(),
            server_validation: default_server_validation(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: default_queue_path(),
            capacity: default_queue_capacity(),
            sync_interval_seconds: default_sync_interval(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout(),
            auth_token: None,
        }
    }
}

// Default value functions
fn default_min_accuracy() -> f64 {
    50.0
}
fn default_accuracy_filter_factor() -> f64 {
    2.0
}
fn default_position_timeout() -> u64 {
    10
}

fn default_revalidation_interval() -> u64 {
    30
}
fn default_cache_ttl() -> u64 {
    60
}
fn default_cache_purge_after() -> u64 {
    300
}
fn default_server_validation() -> bool {
    true
}

fn default_queue_path() -> String {
    "./sitefence-queue.json".to_string()
}
fn default_queue_capacity() -> usize {
    100
}
fn default_sync_interval() -> u64 {
    60
}

fn default_base_url() -> String {
    "http://localhost:5000/api".to_string()
}
fn default_request_timeout() -> u64 {
    15
}

fn default_site_strict_mode() -> bool {
    true
}
