use crate::core_types::ErrorSeverity;
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::log_debug;
use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Longest timeout or delay accepted by configuration validation (one day)
pub const MAX_CONFIGURED_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

pub(crate) fn check_duration(name: &str, value: Duration) -> ResilienceResult<()> {
    if value > MAX_CONFIGURED_DURATION {
        return Err(ResilienceError::configuration_error(format!(
            "{name} must not exceed {}s, got {}s",
            MAX_CONFIGURED_DURATION.as_secs(),
            value.as_secs()
        )));
    }
    Ok(())
}

/// Configuration for the recovery service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Upper bound on plan executions running at the same time
    pub max_concurrent_recoveries: usize,
    /// Timeout given to each planned action
    pub default_timeout: Duration,
    /// Attempts given to planned retry actions
    pub max_retry_attempts: u32,
    pub retry_backoff_multiplier: f64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    pub enable_auto_recovery: bool,
    /// Errors at or above this severity are never recovered automatically
    pub manual_intervention_threshold: ErrorSeverity,
    /// Number of finished executions kept in history
    pub recovery_history_size: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_recoveries: 10,
            default_timeout: Duration::from_secs(30),
            max_retry_attempts: 3,
            retry_backoff_multiplier: 2.0,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            enable_auto_recovery: true,
            manual_intervention_threshold: ErrorSeverity::High,
            recovery_history_size: 1000,
        }
    }
}

impl RecoveryConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if a limit, size or timeout is zero,
    /// a limit or timeout is too large to represent, or the backoff multiplier is below 1.0.
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_concurrent_recoveries == 0 {
            return Err(ResilienceError::configuration_error(
                "max_concurrent_recoveries must be greater than zero",
            ));
        }
        if self.max_concurrent_recoveries > Semaphore::MAX_PERMITS {
            return Err(ResilienceError::configuration_error(format!(
                "max_concurrent_recoveries must not exceed {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.recovery_history_size == 0 {
            return Err(ResilienceError::configuration_error(
                "recovery_history_size must be greater than zero",
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(ResilienceError::configuration_error(
                "default_timeout must be greater than zero",
            ));
        }
        check_duration("default_timeout", self.default_timeout)?;
        check_duration("circuit_breaker_timeout", self.circuit_breaker_timeout)?;
        if self.circuit_breaker_threshold == 0 {
            return Err(ResilienceError::configuration_error(
                "circuit_breaker_threshold must be greater than zero",
            ));
        }
        if self.retry_backoff_multiplier.is_nan() || self.retry_backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration_error(format!(
                "retry_backoff_multiplier must be at least 1.0, got {}",
                self.retry_backoff_multiplier
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration: the recovery service plus the standalone retry mechanism
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub recovery: RecoveryConfig,
    pub retry: RetryConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// Recognised variables:
    /// - `RECOVERY_MAX_CONCURRENT`, `RECOVERY_DEFAULT_TIMEOUT_MS`, `RECOVERY_MAX_RETRY_ATTEMPTS`,
    ///   `RECOVERY_BACKOFF_MULTIPLIER`, `RECOVERY_CIRCUIT_BREAKER_THRESHOLD`,
    ///   `RECOVERY_CIRCUIT_BREAKER_TIMEOUT_MS`, `RECOVERY_AUTO_ENABLED`,
    ///   `RECOVERY_MANUAL_THRESHOLD`, `RECOVERY_HISTORY_SIZE`
    /// - `RETRY_MAX_ATTEMPTS`, `RETRY_BASE_DELAY_MS`, `RETRY_MAX_DELAY_MS`,
    ///   `RETRY_BACKOFF_MULTIPLIER`, `RETRY_JITTER_FACTOR`, `RETRY_TIMEOUT_PER_ATTEMPT_MS`
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if a variable does not parse or the
    /// resulting configuration fails validation.
    pub fn from_env() -> ResilienceResult<Self> {
        log_debug!("Loading recovery configuration from environment");

        let config = Self {
            recovery: Self::recovery_from_env()?,
            retry: Self::retry_from_env()?,
        };

        config.recovery.validate()?;
        config.retry.validate()?;

        log_debug!(
            max_concurrent_recoveries = config.recovery.max_concurrent_recoveries,
            enable_auto_recovery = config.recovery.enable_auto_recovery,
            manual_intervention_threshold = %config.recovery.manual_intervention_threshold,
            retry_max_attempts = config.retry.max_attempts,
            "Recovery configuration loaded and validated"
        );

        Ok(config)
    }

    fn recovery_from_env() -> ResilienceResult<RecoveryConfig> {
        let mut config = RecoveryConfig::default();
        if let Some(value) = env_parse("RECOVERY_MAX_CONCURRENT")? {
            config.max_concurrent_recoveries = value;
        }
        if let Some(ms) = env_parse("RECOVERY_DEFAULT_TIMEOUT_MS")? {
            config.default_timeout = Duration::from_millis(ms);
        }
        if let Some(value) = env_parse("RECOVERY_MAX_RETRY_ATTEMPTS")? {
            config.max_retry_attempts = value;
        }
        if let Some(value) = env_parse("RECOVERY_BACKOFF_MULTIPLIER")? {
            config.retry_backoff_multiplier = value;
        }
        if let Some(value) = env_parse("RECOVERY_CIRCUIT_BREAKER_THRESHOLD")? {
            config.circuit_breaker_threshold = value;
        }
        if let Some(ms) = env_parse("RECOVERY_CIRCUIT_BREAKER_TIMEOUT_MS")? {
            config.circuit_breaker_timeout = Duration::from_millis(ms);
        }
        if let Some(value) = env_parse("RECOVERY_AUTO_ENABLED")? {
            config.enable_auto_recovery = value;
        }
        if let Ok(value) = std::env::var("RECOVERY_MANUAL_THRESHOLD") {
            config.manual_intervention_threshold = ErrorSeverity::parse_lossy(&value);
        }
        if let Some(value) = env_parse("RECOVERY_HISTORY_SIZE")? {
            config.recovery_history_size = value;
        }
        Ok(config)
    }

    fn retry_from_env() -> ResilienceResult<RetryConfig> {
        let mut config = RetryConfig::default();
        if let Some(value) = env_parse("RETRY_MAX_ATTEMPTS")? {
            config.max_attempts = value;
        }
        if let Some(ms) = env_parse("RETRY_BASE_DELAY_MS")? {
            config.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse("RETRY_MAX_DELAY_MS")? {
            config.max_delay = Duration::from_millis(ms);
        }
        if let Some(value) = env_parse("RETRY_BACKOFF_MULTIPLIER")? {
            config.backoff_multiplier = value;
        }
        if let Some(value) = env_parse("RETRY_JITTER_FACTOR")? {
            config.jitter_factor = value;
        }
        if let Some(ms) = env_parse("RETRY_TIMEOUT_PER_ATTEMPT_MS")? {
            config.timeout_per_attempt = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn env_parse<T: FromStr>(name: &str) -> ResilienceResult<Option<T>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim().parse::<T>().map(Some).map_err(|_| {
        ResilienceError::configuration_error(format!("{name} has an invalid value: {raw}"))
    })
}
