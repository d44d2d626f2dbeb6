//! Strategy handlers
//!
//! Every [`RecoveryStrategy`] maps to one [`StrategyHandler`] through a
//! [`HandlerTable`]. Handlers never fail the plan themselves; they return a
//! [`RecoveryResult`] and the executor decides whether to continue.
//!
//! Built-in behaviour:
//! - Retry: runs the operation up to `max_retries` times with exponential backoff,
//!   giving up early if the plan is cancelled while waiting
//! - CircuitBreaker: runs the operation behind the breaker named by the action's
//!   `operation` parameter
//! - ManualIntervention: always fails, an operator has to act
//! - everything else: runs the operation once

use crate::core_types::{RecoveryAction, RecoveryResult, RecoveryStrategy};
use crate::error::ResilienceError;
use crate::executor::operation::RecoveryOperation;
use crate::logging::{log_debug, log_warn};
use crate::retry::{lock_breaker, BreakerRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// Applies one recovery strategy to an action
#[async_trait]
pub trait StrategyHandler: Send + Sync {
    async fn handle(&self, action: &RecoveryAction, cancel: &CancellationToken) -> RecoveryResult;
}

/// Dispatch table from strategy to handler
pub type HandlerTable = HashMap<RecoveryStrategy, Arc<dyn StrategyHandler>>;

/// Build the table of built-in handlers, all driven by `operation`
pub fn default_handlers(
    operation: Arc<dyn RecoveryOperation>,
    breakers: Arc<BreakerRegistry>,
) -> HandlerTable {
    RecoveryStrategy::ALL
        .into_iter()
        .map(|strategy| {
            let handler = handler_for(strategy, Arc::clone(&operation), Arc::clone(&breakers));
            (strategy, handler)
        })
        .collect()
}

/// The built-in handler for a single strategy
pub fn handler_for(
    strategy: RecoveryStrategy,
    operation: Arc<dyn RecoveryOperation>,
    breakers: Arc<BreakerRegistry>,
) -> Arc<dyn StrategyHandler> {
    match strategy {
        RecoveryStrategy::Retry => Arc::new(RetryHandler::new(operation)),
        RecoveryStrategy::CircuitBreaker => {
            Arc::new(CircuitBreakerHandler::new(operation, breakers))
        }
        RecoveryStrategy::ManualIntervention => Arc::new(ManualInterventionHandler),
        RecoveryStrategy::Fallback
        | RecoveryStrategy::GracefulDegradation
        | RecoveryStrategy::Rollback
        | RecoveryStrategy::Compensation
        | RecoveryStrategy::Timeout
        | RecoveryStrategy::ResourceCleanup
        | RecoveryStrategy::DataRecovery => {
            Arc::new(SingleAttemptHandler::new(strategy, operation))
        }
    }
}

/// Retries the operation with exponential backoff
pub struct RetryHandler {
    operation: Arc<dyn RecoveryOperation>,
}

impl RetryHandler {
    pub fn new(operation: Arc<dyn RecoveryOperation>) -> Self {
        Self { operation }
    }

    /// Delay after `attempt`: `backoff * multiplier^(attempt-1)`, never beyond `cap`
    pub fn backoff_delay(
        backoff: Duration,
        multiplier: f64,
        attempt: u32,
        cap: Duration,
    ) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let seconds = backoff.as_secs_f64() * multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(seconds.min(cap.as_secs_f64())).unwrap_or(cap)
    }
}

#[async_trait]
impl StrategyHandler for RetryHandler {
    async fn handle(&self, action: &RecoveryAction, cancel: &CancellationToken) -> RecoveryResult {
        let start = Instant::now();
        let max_attempts = action.max_retries.max(1);
        let multiplier = action.parameter_f64("backoff_multiplier").unwrap_or(2.0);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.operation.perform(action).await {
                Ok(data) => {
                    return RecoveryResult::succeeded(action, attempt, start.elapsed())
                        .with_recovery_data(data)
                        .with_metadata("retries", attempt - 1);
                }
                Err(error) => {
                    last_error = format!("{error:#}");
                    log_debug!(
                        action_id = %action.id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %last_error,
                        "Retry attempt failed"
                    );
                }
            }

            if attempt == max_attempts {
                break;
            }

            let delay = Self::backoff_delay(action.backoff, multiplier, attempt, action.timeout);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return RecoveryResult::failed(
                        action,
                        attempt,
                        start.elapsed(),
                        ResilienceError::cancelled(),
                    )
                    .with_metadata("last_error", last_error);
                }
            }
        }

        RecoveryResult::failed(
            action,
            max_attempts,
            start.elapsed(),
            format!("retry exhausted after {max_attempts} attempts: {last_error}"),
        )
    }
}

/// Runs the operation behind a named circuit breaker
pub struct CircuitBreakerHandler {
    operation: Arc<dyn RecoveryOperation>,
    breakers: Arc<BreakerRegistry>,
}

impl CircuitBreakerHandler {
    pub fn new(operation: Arc<dyn RecoveryOperation>, breakers: Arc<BreakerRegistry>) -> Self {
        Self {
            operation,
            breakers,
        }
    }
}

#[async_trait]
impl StrategyHandler for CircuitBreakerHandler {
    async fn handle(&self, action: &RecoveryAction, _cancel: &CancellationToken) -> RecoveryResult {
        let start = Instant::now();
        let name = action
            .parameter_str("operation")
            .unwrap_or(action.strategy.as_str());
        let breaker = self.breakers.breaker(name);

        let allowed = lock_breaker(&breaker).can_execute();
        if !allowed {
            return RecoveryResult::failed(
                action,
                0,
                start.elapsed(),
                ResilienceError::circuit_open(name),
            )
            .with_metadata("circuit_state", "Open");
        }

        match self.operation.perform(action).await {
            Ok(data) => {
                let state = {
                    let mut breaker = lock_breaker(&breaker);
                    breaker.on_success();
                    breaker.state()
                };
                RecoveryResult::succeeded(action, 1, start.elapsed())
                    .with_recovery_data(data)
                    .with_metadata("circuit_state", format!("{state:?}"))
            }
            Err(error) => {
                let state = {
                    let mut breaker = lock_breaker(&breaker);
                    breaker.on_failure();
                    breaker.state()
                };
                RecoveryResult::failed(action, 1, start.elapsed(), format!("{error:#}"))
                    .with_metadata("circuit_state", format!("{state:?}"))
            }
        }
    }
}

/// Hands the error to a human; never succeeds on its own
pub struct ManualInterventionHandler;

#[async_trait]
impl StrategyHandler for ManualInterventionHandler {
    async fn handle(&self, action: &RecoveryAction, _cancel: &CancellationToken) -> RecoveryResult {
        log_warn!(
            action_id = %action.id,
            description = %action.description,
            "Recovery requires manual intervention"
        );
        RecoveryResult::failed(
            action,
            1,
            Duration::ZERO,
            format!("manual intervention required: {}", action.description),
        )
        .with_metadata("requires_operator", true)
    }
}

/// Runs the operation once and tags the result with what the strategy achieved
pub struct SingleAttemptHandler {
    strategy: RecoveryStrategy,
    operation: Arc<dyn RecoveryOperation>,
}

impl SingleAttemptHandler {
    pub fn new(strategy: RecoveryStrategy, operation: Arc<dyn RecoveryOperation>) -> Self {
        Self {
            strategy,
            operation,
        }
    }

    fn tag(&self, result: RecoveryResult, action: &RecoveryAction) -> RecoveryResult {
        match self.strategy {
            RecoveryStrategy::Fallback => result.with_metadata("fallback_used", true),
            RecoveryStrategy::GracefulDegradation => result.with_metadata("degraded", true),
            RecoveryStrategy::Rollback => result.with_metadata("rolled_back", true),
            RecoveryStrategy::Compensation => result.with_metadata("compensated", true),
            RecoveryStrategy::Timeout => result.with_metadata(
                "extended_timeout_ms",
                u64::try_from(action.timeout.as_millis()).unwrap_or(u64::MAX),
            ),
            RecoveryStrategy::ResourceCleanup => result.with_metadata("resources_released", true),
            RecoveryStrategy::DataRecovery => result.with_metadata("data_recovered", true),
            RecoveryStrategy::Retry
            | RecoveryStrategy::CircuitBreaker
            | RecoveryStrategy::ManualIntervention => result,
        }
    }
}

#[async_trait]
impl StrategyHandler for SingleAttemptHandler {
    async fn handle(&self, action: &RecoveryAction, _cancel: &CancellationToken) -> RecoveryResult {
        let start = Instant::now();
        match self.operation.perform(action).await {
            Ok(data) => {
                let result = RecoveryResult::succeeded(action, 1, start.elapsed())
                    .with_recovery_data(data);
                self.tag(result, action)
            }
            Err(error) => RecoveryResult::failed(action, 1, start.elapsed(), format!("{error:#}")),
        }
    }
}
