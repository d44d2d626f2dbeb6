use crate::error::ResilienceError;
use crate::retry::{BreakerRegistry, CircuitBreaker, CircuitState, RetryConfig, RetryMechanism};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to create fast test retry config to prevent slow tests
    fn create_fast_test_retry_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            timeout_per_attempt: Duration::from_millis(100),
            ..RetryConfig::default()
        }
    }

    // Unit Tests for RetryConfig
    //
    // UNIT UNDER TEST: RetryConfig (concrete implementation)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Provides configuration parameters for retry behavior and timing
    //   - Defines exponential backoff progression (100ms, 200ms, 400ms ... 30s max)
    //   - Sets the keyword lists that decide which failures are transient
    //
    // TEST COVERAGE:
    //   - Default configuration values match the documented defaults
    //   - Validation rejects inconsistent settings

    #[test]
    fn test_retry_config_defaults_match_documented_values() {
        // Arrange
        let config = RetryConfig::default();

        // Act & Assert
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.jitter_factor, 0.1);
        assert_eq!(config.timeout_per_attempt, Duration::from_secs(5));
        assert_eq!(config.circuit_breaker_threshold, 5);
        assert_eq!(config.circuit_breaker_timeout, Duration::from_secs(60));
        assert!(config.retryable_errors.iter().any(|k| k == "timeout"));
        assert!(config.non_retryable_errors.iter().any(|k| k == "unauthorized"));
        assert!(config.validate().is_ok(), "Defaults should validate");
    }

    #[test]
    fn test_retry_config_validation_rejects_bad_values() {
        // Arrange
        let zero_attempts = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        let inverted_delays = RetryConfig {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        };
        let wild_jitter = RetryConfig {
            jitter_factor: 1.5,
            ..RetryConfig::default()
        };

        let huge_delays = RetryConfig {
            base_delay: Duration::from_secs(u64::MAX),
            max_delay: Duration::from_secs(u64::MAX),
            ..RetryConfig::default()
        };
        let huge_attempt_timeout = RetryConfig {
            timeout_per_attempt: Duration::MAX,
            ..RetryConfig::default()
        };

        // Act & Assert
        for config in [
            zero_attempts,
            inverted_delays,
            wild_jitter,
            huge_delays,
            huge_attempt_timeout,
        ] {
            assert!(matches!(
                config.validate(),
                Err(ResilienceError::ConfigurationError { .. })
            ));
        }
    }

    // Unit Tests for CircuitBreaker
    //
    // UNIT UNDER TEST: CircuitBreaker (concrete implementation)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Tracks failure patterns to detect when an operation becomes unhealthy
    //   - Blocks calls during outages to prevent resource waste
    //   - Tests recovery with half-open state transitions
    //
    // TEST COVERAGE:
    //   - Closed -> Open once the failure threshold is reached
    //   - Open stays closed to calls until the timeout elapses, then HalfOpen
    //   - HalfOpen -> Closed on success (count reset), HalfOpen -> Open on failure

    /// Helper function to create concrete circuit breaker for testing
    fn create_concrete_circuit_breaker() -> CircuitBreaker {
        CircuitBreaker::new(2, Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_protects_against_cascading_failures() {
        // Arrange
        let mut cb = create_concrete_circuit_breaker();

        // Act & Assert - Initially should allow calls in healthy state
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute(), "Should allow calls when healthy");

        // First failure should keep circuit closed
        cb.on_failure();
        assert_eq!(
            cb.state(),
            CircuitState::Closed,
            "Single failure should not trigger circuit breaker"
        );
        assert!(cb.can_execute());

        // Second failure reaches the threshold
        cb.on_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute(), "Should block calls when circuit is open");

        // Still blocked before the timeout has elapsed
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!cb.can_execute(), "Should keep blocking before timeout");
        assert_eq!(cb.state(), CircuitState::Open);

        // After the timeout, a probe is allowed
        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(cb.can_execute(), "Should allow probe after timeout");
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Successful probe closes the circuit and resets the count
        cb.on_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(cb.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_reopens_when_half_open_probe_fails() {
        // Arrange
        let mut cb = CircuitBreaker::new(3, Duration::from_millis(100));
        for _ in 0..3 {
            cb.on_failure();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(cb.can_execute());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        // Act
        cb.on_failure();

        // Assert
        assert_eq!(
            cb.state(),
            CircuitState::Open,
            "A single failure while half-open should reopen immediately"
        );
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_while_closed_resets_failure_count() {
        // Arrange
        let mut cb = CircuitBreaker::new(3, Duration::from_secs(1));
        cb.on_failure();
        cb.on_failure();

        // Act
        cb.on_success();
        cb.on_failure();
        cb.on_failure();

        // Assert
        assert_eq!(
            cb.state(),
            CircuitState::Closed,
            "Failures must be consecutive to open the circuit"
        );
        assert_eq!(cb.failure_count(), 2);
    }

    #[test]
    fn test_registry_creates_one_breaker_per_name() {
        // Arrange
        let registry = BreakerRegistry::new(1, Duration::from_secs(60));

        // Act
        let first = registry.breaker("database");
        let again = registry.breaker("database");
        let other = registry.breaker("cache");
        crate::retry::lock_breaker(&first).on_failure();

        // Assert
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state("database"), Some(CircuitState::Open));
        assert_eq!(registry.state("cache"), Some(CircuitState::Closed));
        assert_eq!(registry.state("unknown"), None);
        assert!(registry.reset("database"));
        assert_eq!(registry.state("database"), Some(CircuitState::Closed));
    }

    // Unit Tests for RetryMechanism
    //
    // UNIT UNDER TEST: RetryMechanism (concrete implementation)
    //
    // BUSINESS RESPONSIBILITY:
    //   - Handles transient failures with exponential backoff and jitter
    //   - Gives up immediately on permanent failures
    //   - Refuses to call operations whose circuit is open
    //   - Stops waiting when the caller cancels
    //
    // TEST COVERAGE:
    //   - Delay bounds across attempts
    //   - Keyword classification precedence
    //   - Attempt counting for success, retryable and non-retryable failures
    //   - Circuit breaker hits and cancellation during backoff

    /// Helper function to create concrete retry mechanism for testing
    fn create_concrete_retry_mechanism() -> RetryMechanism {
        RetryMechanism::new(create_fast_test_retry_config())
    }

    #[test]
    fn test_calculate_delay_stays_within_bounds() {
        // Arrange
        let mechanism = RetryMechanism::new(RetryConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            ..RetryConfig::default()
        });
        let upper = Duration::from_secs(2).as_secs_f64() * 1.1;

        // Act & Assert
        for attempt in 1..=20 {
            for _ in 0..50 {
                let delay = mechanism.calculate_delay(attempt);
                assert!(
                    delay >= Duration::from_millis(100),
                    "Delay {delay:?} below base delay at attempt {attempt}"
                );
                assert!(
                    delay.as_secs_f64() <= upper + 1e-9,
                    "Delay {delay:?} above max delay plus jitter at attempt {attempt}"
                );
            }
        }
    }

    #[test]
    fn test_calculate_delay_falls_back_to_max_delay_when_unrepresentable() {
        // Arrange
        let max_delay = Duration::from_secs(u64::MAX);
        let mechanism = RetryMechanism::new(RetryConfig {
            base_delay: max_delay,
            max_delay,
            ..RetryConfig::default()
        });

        // Act
        let delay = mechanism.calculate_delay(1);

        // Assert
        assert_eq!(delay, max_delay);
    }

    #[test]
    fn test_calculate_delay_grows_exponentially_without_jitter() {
        // Arrange
        let mechanism = RetryMechanism::new(RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        });

        // Act & Assert
        assert_eq!(mechanism.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(mechanism.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(mechanism.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(mechanism.calculate_delay(30), Duration::from_secs(30));
    }

    #[test]
    fn test_non_retryable_keywords_take_precedence() {
        // Arrange
        let mechanism = RetryMechanism::default();

        // Act & Assert
        assert!(mechanism.is_retryable("connection refused by upstream"));
        assert!(
            !mechanism.is_retryable("invalid request: connection timeout"),
            "Non-retryable keyword should win over retryable keyword"
        );
        assert!(!mechanism.is_retryable("401 Unauthorized"));
        assert!(
            mechanism.is_retryable("something entirely unexpected"),
            "Unknown errors default to retryable"
        );
    }

    #[tokio::test]
    async fn test_successful_operation_requires_no_retries() {
        // Arrange
        let mechanism = create_concrete_retry_mechanism();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // Act
        let result = mechanism
            .execute_with_retry(&CancellationToken::new(), "fetch", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("success".to_string())
                }
            })
            .await;

        // Assert
        assert!(result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.value.as_deref(), Some("success"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(mechanism.stats().successful_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_errors_are_retried_until_success() {
        // Arrange
        let mechanism = create_concrete_retry_mechanism();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // Act
        let result = mechanism
            .execute_with_retry(&CancellationToken::new(), "fetch", || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err("service unavailable".to_string())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        // Assert
        assert!(result.success, "Should eventually succeed after retries");
        assert_eq!(result.attempts, 3);
        assert_eq!(result.value, Some(42));
        assert_eq!(mechanism.stats().total_retries, 2);
        assert_eq!(
            mechanism.circuit_state("fetch"),
            Some(CircuitState::Closed),
            "Success should reset the breaker"
        );
    }

    #[tokio::test]
    async fn test_non_retryable_error_returns_immediately() {
        // Arrange
        let mechanism = create_concrete_retry_mechanism();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // Act
        let result = mechanism
            .execute_with_retry(&CancellationToken::new(), "login", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("authentication rejected")
                }
            })
            .await;

        // Assert
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(result.last_error.as_deref(), Some("authentication rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_report_last_error() {
        // Arrange
        let mechanism = create_concrete_retry_mechanism();

        // Act
        let result = mechanism
            .retry(&CancellationToken::new(), "fetch", || async {
                Err::<(), _>("connection reset")
            })
            .await;

        // Assert
        match result {
            Err(ResilienceError::RetriesExhausted {
                operation,
                attempts,
                message,
            }) => {
                assert_eq!(operation, "fetch");
                assert_eq!(attempts, 3);
                assert_eq!(message, "connection reset");
            }
            other => panic!("Expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_time_out_and_count_as_retryable() {
        // Arrange
        let mechanism = create_concrete_retry_mechanism();

        // Act
        let result = mechanism
            .execute_with_retry(&CancellationToken::new(), "slow", || async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, String>(())
            })
            .await;

        // Assert
        assert!(!result.success);
        assert_eq!(result.attempts, 3, "Timeouts should be retried");
        assert!(result
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("timed out")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_blocks_operation() {
        // Arrange
        let mechanism = RetryMechanism::new(RetryConfig {
            circuit_breaker_threshold: 2,
            ..create_fast_test_retry_config()
        });
        let cancel = CancellationToken::new();
        let first = mechanism
            .execute_with_retry(&cancel, "flaky", || async { Err::<(), _>("network down") })
            .await;
        assert!(!first.success);
        assert_eq!(mechanism.circuit_state("flaky"), Some(CircuitState::Open));

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        // Act
        let blocked = mechanism
            .execute_with_retry(&cancel, "flaky", || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                }
            })
            .await;

        // Assert
        assert!(blocked.circuit_breaker_hit);
        assert!(!blocked.success);
        assert_eq!(counter.load(Ordering::SeqCst), 0, "Operation must not run");
        assert_eq!(mechanism.stats().circuit_breaker_hits, 1);
        assert!(matches!(
            blocked.into_result("flaky"),
            Err(ResilienceError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_backoff_wait() {
        // Arrange
        let mechanism = RetryMechanism::new(RetryConfig {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(10),
            ..create_fast_test_retry_config()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        // Act
        let result = mechanism
            .execute_with_retry(&cancel, "fetch", move || {
                let trigger = trigger.clone();
                async move {
                    trigger.cancel();
                    Err::<(), _>("timeout")
                }
            })
            .await;

        // Assert
        assert!(result.timed_out);
        assert_eq!(result.attempts, 1);
        assert!(
            result.total_duration < Duration::from_secs(5),
            "Should not wait out the backoff delay"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_a_running_attempt() {
        // Arrange
        let mechanism = RetryMechanism::new(RetryConfig {
            timeout_per_attempt: Duration::from_secs(60),
            circuit_breaker_threshold: 1,
            ..create_fast_test_retry_config()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        // Act
        let result = mechanism
            .execute_with_retry(&cancel, "export", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, String>(())
            })
            .await;

        // Assert
        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(result.attempts, 1);
        assert!(
            result.total_duration < Duration::from_secs(1),
            "Should not wait for the attempt timeout, took {:?}",
            result.total_duration
        );
        assert_eq!(
            mechanism.circuit_state("export"),
            Some(CircuitState::Closed),
            "A cancelled attempt is not a breaker failure"
        );
        assert_eq!(result.into_result("export"), Err(ResilienceError::Cancelled));
    }
}
