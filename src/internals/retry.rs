//! Retry logic with exponential backoff and per-operation circuit breaking
//!
//! This module provides a general-purpose resilience primitive that any call site can
//! use, independent of recovery plans:
//! - Exponential backoff: 100ms, 200ms, 400ms ... capped at 30s, with ±10% jitter
//! - Keyword-based retryability: non-retryable keywords win, unknown errors are retried
//! - Circuit breaker pattern: 5 failures = 60s cooldown, one breaker per operation name
//! - Per-attempt timeout: 5s, cancellation stops a running attempt or a backoff wait

use crate::config::check_duration;
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::{log_debug, log_error, log_warn};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Retry configuration for [`RetryMechanism`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry, also the lower bound of every delay
    pub base_delay: Duration,
    /// Maximum delay between retries before jitter is applied
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Fraction of the delay added or removed at random
    pub jitter_factor: f64,
    /// Timeout for individual attempts
    pub timeout_per_attempt: Duration,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    /// Substrings marking an error as worth retrying
    pub retryable_errors: Vec<String>,
    /// Substrings marking an error as permanent. Checked before `retryable_errors`.
    pub non_retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            timeout_per_attempt: Duration::from_secs(5),
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(60),
            retryable_errors: [
                "timeout",
                "timed out",
                "connection refused",
                "connection reset",
                "temporary failure",
                "service unavailable",
                "too many requests",
                "rate limit",
                "deadline exceeded",
                "network",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            non_retryable_errors: [
                "invalid",
                "unauthorized",
                "forbidden",
                "not found",
                "bad request",
                "permission denied",
                "authentication",
                "validation",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl RetryConfig {
    /// Validate the retry configuration
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if attempts or thresholds are zero,
    /// delays are inconsistent or longer than a day, or the jitter factor is outside `[0, 1]`.
    pub fn validate(&self) -> ResilienceResult<()> {
        if self.max_attempts == 0 {
            return Err(ResilienceError::configuration_error(
                "max_attempts must be greater than zero",
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(ResilienceError::configuration_error(
                "base_delay must not exceed max_delay",
            ));
        }
        check_duration("max_delay", self.max_delay)?;
        check_duration("timeout_per_attempt", self.timeout_per_attempt)?;
        check_duration("circuit_breaker_timeout", self.circuit_breaker_timeout)?;
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ResilienceError::configuration_error(
                "backoff_multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ResilienceError::configuration_error(
                "jitter_factor must be between 0.0 and 1.0",
            ));
        }
        if self.timeout_per_attempt.is_zero() {
            return Err(ResilienceError::configuration_error(
                "timeout_per_attempt must be greater than zero",
            ));
        }
        if self.circuit_breaker_threshold == 0 {
            return Err(ResilienceError::configuration_error(
                "circuit_breaker_threshold must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, blocking calls
    HalfOpen, // Testing if the operation recovered
}

/// Circuit breaker guarding a single named operation
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            threshold,
            timeout,
        }
    }

    /// Check if a call should be allowed through the circuit breaker
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => self.check_recovery_timeout(),
            CircuitState::HalfOpen => true,
        }
    }

    /// Check if circuit breaker should transition from Open to HalfOpen
    fn check_recovery_timeout(&mut self) -> bool {
        let Some(last_failure) = self.last_failure_time else {
            return false;
        };

        if last_failure.elapsed() > self.timeout {
            log_debug!(
                circuit_breaker = "transitioning_to_half_open",
                timeout_ms = self.timeout.as_millis(),
                "Circuit breaker attempting recovery"
            );
            self.state = CircuitState::HalfOpen;
            true
        } else {
            false
        }
    }

    /// Record a successful call
    pub fn on_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                log_debug!(
                    circuit_breaker = "recovered",
                    "Circuit breaker recovered, returning to closed state"
                );
                self.state = CircuitState::Closed;
                self.failure_count = 0;
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {
                // A call slipped through while open; only the count is reset
                self.failure_count = 0;
            }
        }
    }

    /// Record a failed call
    pub fn on_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitState::HalfOpen => {
                log_warn!(
                    circuit_breaker = "reopened",
                    failure_count = self.failure_count,
                    "Circuit breaker probe failed, reopening"
                );
                self.state = CircuitState::Open;
            }
            CircuitState::Closed if self.failure_count >= self.threshold => {
                log_warn!(
                    circuit_breaker = "opened",
                    failure_count = self.failure_count,
                    failure_threshold = self.threshold,
                    timeout_ms = self.timeout.as_millis(),
                    "Circuit breaker opened due to repeated failures"
                );
                self.state = CircuitState::Open;
            }
            _ => {}
        }
    }

    /// Force the breaker back to a fresh closed state
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.last_failure_time = None;
    }

    /// Get current circuit breaker state
    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

/// Lock a breaker, recovering the guard if another holder panicked
pub(crate) fn lock_breaker(breaker: &Mutex<CircuitBreaker>) -> MutexGuard<'_, CircuitBreaker> {
    breaker.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lazily-populated set of circuit breakers keyed by operation name
///
/// Breakers live as long as the registry. Each one sits behind its own mutex so
/// unrelated operations never contend.
#[derive(Debug)]
pub struct BreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<Mutex<CircuitBreaker>>>>,
    threshold: u32,
    timeout: Duration,
}

impl BreakerRegistry {
    pub fn new(threshold: u32, timeout: Duration) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            threshold,
            timeout,
        }
    }

    /// Get the breaker for `name`, creating a closed one on first use
    pub fn breaker(&self, name: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(existing) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Arc::clone(existing);
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            log_debug!(
                operation = name,
                threshold = self.threshold,
                "Creating circuit breaker"
            );
            Arc::new(Mutex::new(CircuitBreaker::new(self.threshold, self.timeout)))
        });
        Arc::clone(breaker)
    }

    /// State of the breaker for `name`, if one has been created
    pub fn state(&self, name: &str) -> Option<CircuitState> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|breaker| lock_breaker(breaker).state())
    }

    /// Reset the breaker for `name`. Returns false if no breaker exists.
    pub fn reset(&self, name: &str) -> bool {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        match breakers.get(name) {
            Some(breaker) => {
                lock_breaker(breaker).reset();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of [`RetryMechanism::execute_with_retry`]
#[derive(Debug)]
pub struct RetryResult<T> {
    /// Value returned by the successful attempt
    pub value: Option<T>,
    pub success: bool,
    pub attempts: u32,
    pub total_duration: Duration,
    pub last_error: Option<String>,
    /// The breaker refused the call, so the operation never ran
    pub circuit_breaker_hit: bool,
    /// Cancellation arrived while waiting between attempts
    pub timed_out: bool,
}

impl<T> RetryResult<T> {
    fn new() -> Self {
        Self {
            value: None,
            success: false,
            attempts: 0,
            total_duration: Duration::ZERO,
            last_error: None,
            circuit_breaker_hit: false,
            timed_out: false,
        }
    }

    /// Convert into a `Result`, mapping each failure mode onto a [`ResilienceError`]
    pub fn into_result(self, operation: &str) -> ResilienceResult<T> {
        if let Some(value) = self.value {
            return Ok(value);
        }
        if self.circuit_breaker_hit {
            return Err(ResilienceError::circuit_open(operation));
        }
        if self.timed_out {
            return Err(ResilienceError::cancelled());
        }
        Err(ResilienceError::retries_exhausted(
            operation,
            self.attempts,
            self.last_error.unwrap_or_default(),
        ))
    }
}

/// Aggregate counters kept by a [`RetryMechanism`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryStats {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Attempts beyond the first, summed over all operations
    pub total_retries: u64,
    pub circuit_breaker_hits: u64,
}

/// Retry executor that handles exponential backoff and circuit breaking
#[derive(Debug)]
pub struct RetryMechanism {
    config: RetryConfig,
    breakers: Arc<BreakerRegistry>,
    stats: Mutex<RetryStats>,
}

impl Default for RetryMechanism {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryMechanism {
    /// Create a new retry mechanism with its own breaker registry
    pub fn new(config: RetryConfig) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout,
        ));
        Self::with_registry(config, breakers)
    }

    /// Create a retry mechanism that shares breakers with other components
    pub fn with_registry(config: RetryConfig, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            config,
            breakers,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub fn circuit_state(&self, name: &str) -> Option<CircuitState> {
        self.breakers.state(name)
    }

    pub fn reset_circuit(&self, name: &str) -> bool {
        self.breakers.reset(name)
    }

    pub fn stats(&self) -> RetryStats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute `operation` with retry logic and circuit breaking
    ///
    /// The breaker registered under `name` is consulted once, before the first attempt.
    /// Each attempt is bounded by `timeout_per_attempt`; a timed-out attempt counts as a
    /// retryable failure. Cancelling `cancel` during an attempt or while waiting between
    /// attempts aborts the loop and flags the result as `timed_out`.
    pub async fn execute_with_retry<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        mut operation: F,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start_time = Instant::now();
        let breaker = self.breakers.breaker(name);
        let mut result = RetryResult::new();

        let allowed = lock_breaker(&breaker).can_execute();
        if !allowed {
            result.circuit_breaker_hit = true;
            result.last_error = Some(ResilienceError::circuit_open(name).to_string());
            return self.finish(result, name, start_time);
        }

        let max_attempts = self.config.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            result.attempts = attempt;
            log_debug!(
                operation = name,
                attempt = attempt,
                max_attempts = max_attempts,
                "Executing operation with retry logic"
            );

            let attempt_future = tokio::time::timeout(self.config.timeout_per_attempt, operation());
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log_warn!(
                        operation = name,
                        attempt = attempt,
                        "Attempt cancelled while running, aborting"
                    );
                    result.timed_out = true;
                    result.last_error = Some(ResilienceError::cancelled().to_string());
                    break;
                }
                outcome = attempt_future => outcome,
            };

            let message = match outcome {
                Ok(Ok(value)) => {
                    lock_breaker(&breaker).on_success();
                    result.value = Some(value);
                    result.success = true;
                    return self.finish(result, name, start_time);
                }
                Ok(Err(error)) => error.to_string(),
                Err(_elapsed) => {
                    ResilienceError::timeout(self.config.timeout_per_attempt).to_string()
                }
            };

            if !self.is_retryable(&message) {
                log_warn!(
                    operation = name,
                    attempt = attempt,
                    error = %message,
                    "Non-retryable error, giving up"
                );
                result.last_error = Some(message);
                break;
            }

            lock_breaker(&breaker).on_failure();
            result.last_error = Some(message);

            if attempt == max_attempts {
                break;
            }

            let delay = self.calculate_delay(attempt);
            log_debug!(
                operation = name,
                attempt = attempt,
                delay_ms = delay.as_millis(),
                error = ?result.last_error,
                "Operation failed, retrying after delay"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel.cancelled() => {
                    log_warn!(
                        operation = name,
                        attempt = attempt,
                        "Retry wait cancelled, aborting"
                    );
                    result.timed_out = true;
                    break;
                }
            }
        }

        self.finish(result, name, start_time)
    }

    /// Like [`execute_with_retry`](Self::execute_with_retry), collapsed into a `Result`
    pub async fn retry<F, Fut, T, E>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_with_retry(cancel, name, operation)
            .await
            .into_result(name)
    }

    fn finish<T>(
        &self,
        mut result: RetryResult<T>,
        name: &str,
        start_time: Instant,
    ) -> RetryResult<T> {
        result.total_duration = start_time.elapsed();

        {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.total_operations += 1;
            stats.total_retries += u64::from(result.attempts.saturating_sub(1));
            if result.success {
                stats.successful_operations += 1;
            } else {
                stats.failed_operations += 1;
            }
            if result.circuit_breaker_hit {
                stats.circuit_breaker_hits += 1;
            }
        }

        if result.success {
            log_debug!(
                operation = name,
                attempts = result.attempts,
                duration_ms = result.total_duration.as_millis(),
                "Operation succeeded"
            );
        } else {
            log_error!(
                operation = name,
                attempts = result.attempts,
                total_duration_ms = result.total_duration.as_millis(),
                circuit_breaker_hit = result.circuit_breaker_hit,
                timed_out = result.timed_out,
                error = ?result.last_error,
                "Operation failed after retry attempts"
            );
        }

        result
    }

    /// Decide whether an error message describes a transient failure
    ///
    /// Non-retryable keywords take precedence. Messages matching neither list are retried.
    pub fn is_retryable(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        let matches = |keywords: &[String]| {
            keywords
                .iter()
                .any(|keyword| message.contains(&keyword.to_lowercase()))
        };

        if matches(&self.config.non_retryable_errors) {
            return false;
        }
        if matches(&self.config.retryable_errors) {
            return true;
        }
        true
    }

    /// Calculate delay for exponential backoff
    ///
    /// `min(base * multiplier^(attempt-1), max_delay)`, perturbed by up to
    /// `±jitter_factor` and never shorter than `base_delay`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_secs_f64();
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let mut delay = (base * self.config.backoff_multiplier.powi(exponent))
            .min(self.config.max_delay.as_secs_f64());

        // Add jitter to prevent thundering herd
        let jitter = delay * self.config.jitter_factor * (fastrand::f64() * 2.0 - 1.0);
        delay += jitter;

        Duration::try_from_secs_f64(delay.max(base)).unwrap_or(self.config.max_delay)
    }
}
