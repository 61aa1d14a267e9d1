use crate::error::{BackendError, PositionError, SitefenceError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Maximum relative jitter applied to a backoff delay
const JITTER_RATIO: f64 = 0.1;

/// Backoff policy for one class of operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Growth factor applied per retry
    pub backoff_multiplier: f64,
    /// Randomise each delay by up to ±10%
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64, backoff_multiplier: f64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
            backoff_multiplier,
            jitter: false,
        }
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Deterministic delay after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay_ms = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }

    /// Delay actually slept, with jitter when enabled
    fn sleep_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter || delay.is_zero() {
            return delay;
        }

        let factor = 1.0 + rand::thread_rng().gen_range(-JITTER_RATIO..=JITTER_RATIO);
        delay.mul_f64(factor)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err(format!(
                "backoff_multiplier must be at least 1.0 (got {})",
                self.backoff_multiplier
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

/// Named operation classes, each with its own policy and retry predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Network,
    Api,
    Auth,
    Geofence,
    DataLoad,
}

impl RetryClass {
    pub fn default_policy(&self) -> RetryPolicy {
        match self {
            RetryClass::Network => RetryPolicy::new(3, 1_000, 10_000, 2.0).with_jitter(true),
            RetryClass::Api => RetryPolicy::new(3, 2_000, 15_000, 2.0).with_jitter(true),
            RetryClass::Auth => RetryPolicy::new(2, 1_000, 5_000, 2.0),
            RetryClass::Geofence => RetryPolicy::new(2, 1_000, 5_000, 1.5).with_jitter(true),
            RetryClass::DataLoad => RetryPolicy::new(3, 1_500, 12_000, 2.0).with_jitter(true),
        }
    }

    /// Decide whether a failure of this class is worth another attempt
    pub fn should_retry(&self, error: &SitefenceError) -> bool {
        match error {
            // Permission problems never resolve by waiting
            SitefenceError::Position(PositionError::PermissionDenied) => false,
            SitefenceError::Position(_) => matches!(self, RetryClass::Geofence),
            SitefenceError::Backend(backend) => match backend.status() {
                None => matches!(backend, BackendError::NoResponse { .. }),
                Some(status) => match self {
                    RetryClass::Network => matches!(status, 408 | 429 | 502 | 503 | 504),
                    RetryClass::Api | RetryClass::Geofence | RetryClass::DataLoad => {
                        status >= 500 || status == 429 || status == 408
                    }
                    RetryClass::Auth => false,
                },
            },
            SitefenceError::Io(_) => matches!(self, RetryClass::DataLoad),
            _ => false,
        }
    }
}

impl fmt::Display for RetryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RetryClass::Network => "network",
            RetryClass::Api => "api",
            RetryClass::Auth => "auth",
            RetryClass::Geofence => "geofence",
            RetryClass::DataLoad => "data_load",
        };
        f.write_str(name)
    }
}

/// Per-class retry policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub network: RetryPolicy,
    pub api: RetryPolicy,
    pub auth: RetryPolicy,
    pub geofence: RetryPolicy,
    pub data_load: RetryPolicy,
}

impl RetryConfig {
    pub fn policy(&self, class: RetryClass) -> &RetryPolicy {
        match class {
            RetryClass::Network => &self.network,
            RetryClass::Api => &self.api,
            RetryClass::Auth => &self.auth,
            RetryClass::Geofence => &self.geofence,
            RetryClass::DataLoad => &self.data_load,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            network: RetryClass::Network.default_policy(),
            api: RetryClass::Api.default_policy(),
            auth: RetryClass::Auth.default_policy(),
            geofence: RetryClass::Geofence.default_policy(),
            data_load: RetryClass::DataLoad.default_policy(),
        }
    }
}

/// Runs fallible async operations under a backoff policy
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` with the policy and predicate of `class`
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        class: RetryClass,
        operation: &str,
        op: F,
    ) -> Result<T, SitefenceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SitefenceError>>,
    {
        let policy = self.config.policy(class).clone();
        execute_with_predicate(&policy, |error| class.should_retry(error), operation, op).await
    }
}

/// Generic retry combinator.
///
/// Makes at most `policy.max_retries + 1` attempts. Errors rejected by
/// `should_retry` are returned as-is; running out of attempts wraps the last
/// error in [`SitefenceError::RetryExhausted`].
pub async fn execute_with_predicate<T, P, F, Fut>(
    policy: &RetryPolicy,
    should_retry: P,
    operation: &str,
    mut op: F,
) -> Result<T, SitefenceError>
where
    P: Fn(&SitefenceError) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SitefenceError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}/{}", operation, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !should_retry(&error) {
            debug!("{} failed with non-retryable error: {}", operation, error);
            return Err(error);
        }

        if attempt >= max_attempts {
            error!(
                "{} failed after {} attempts: {}",
                operation, attempt, error
            );
            return Err(SitefenceError::RetryExhausted {
                operation: operation.to_string(),
                attempts: attempt,
                last_error: Box::new(error),
            });
        }

        let delay = policy.sleep_for_attempt(attempt);
        warn!(
            "{} failed (attempt {}/{}): {}; retrying in {:?}",
            operation, attempt, max_attempts, error, delay
        );
        sleep(delay).await;
    }
}
