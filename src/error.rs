//! Error types for recovery operations.
//!
//! The main error type is [`ResilienceError`]. It covers:
//! - Input failures (an error that could not be categorized)
//! - Policy refusals (auto-recovery disabled, severity above the manual threshold)
//! - Plan-level failures (all actions failed, a critical action failed, cancellation)
//! - Retry and circuit breaker outcomes
//! - Configuration problems
//!
//! Action-level failures are *not* errors in this sense. They are recorded as data on
//! each [`RecoveryResult`](crate::RecoveryResult) and inspected by the executor.
//!
//! # Example
//!
//! ```rust
//! use resilience_engine::ResilienceError;
//!
//! let err = ResilienceError::auto_recovery_disabled();
//! assert!(err.is_policy_refusal());
//! assert!(err.to_string().contains("auto recovery is disabled"));
//! ```

use crate::core_types::{ErrorSeverity, ExecutionStatus, RecoveryStrategy};
use crate::logging::{log_error, log_info, log_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Convenient result type for recovery operations.
pub type ResilienceResult<T> = std::result::Result<T, ResilienceError>;

/// Errors produced by the recovery engine.
///
/// Errors are `Clone` and serializable so they can be stored on a
/// [`RecoveryExecution`](crate::RecoveryExecution) and handed out from history.
///
/// Use the constructor methods, which log at the appropriate level.
///
/// | Variant | Policy refusal | Retryable |
/// |---------|----------------|-----------|
/// | `CategorizationFailed` | No | No |
/// | `AutoRecoveryDisabled` | Yes | No |
/// | `ManualInterventionRequired` | Yes | No |
/// | `UnknownStrategy` | No | No |
/// | `InvalidPlan` | No | No |
/// | `CriticalActionFailed` | No | No |
/// | `AllActionsFailed` | No | Yes |
/// | `Cancelled` | No | No |
/// | `Timeout` | No | Yes |
/// | `CircuitOpen` | No | Yes |
/// | `RetriesExhausted` | No | No |
/// | `InvalidTransition` | No | No |
/// | `ConfigurationError` | No | No |
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResilienceError {
    /// The categorizer could not classify the error.
    #[error("error categorization failed: {message}")]
    CategorizationFailed {
        /// The message of the error that could not be categorized.
        message: String,
    },

    /// Auto-recovery is switched off in the service configuration.
    #[error("auto recovery is disabled")]
    AutoRecoveryDisabled,

    /// The error is too severe to be handled automatically.
    #[error("manual intervention required for error {error_id} with severity {severity}")]
    ManualInterventionRequired {
        /// Identifier of the categorized error.
        error_id: String,
        /// Severity reported by the categorizer.
        severity: ErrorSeverity,
    },

    /// No handler is registered for a strategy, or a strategy name did not parse.
    #[error("unknown recovery strategy: {strategy}")]
    UnknownStrategy {
        /// The strategy name as it was encountered.
        strategy: String,
    },

    /// A plan failed validation before execution.
    #[error("invalid recovery plan: {message}")]
    InvalidPlan {
        /// Why the plan was rejected.
        message: String,
    },

    /// A critical action failed and the plan was aborted.
    #[error("critical recovery action {action_id} ({strategy}) failed: {message}")]
    CriticalActionFailed {
        /// Identifier of the failed action.
        action_id: String,
        /// Strategy of the failed action.
        strategy: RecoveryStrategy,
        /// The action's own error message.
        message: String,
    },

    /// Every action in the plan ran and none succeeded.
    #[error("all recovery actions failed")]
    AllActionsFailed,

    /// The caller cancelled the recovery.
    #[error("recovery cancelled")]
    Cancelled,

    /// An operation did not complete within its time budget.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The budget that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// The circuit breaker for an operation refused the call.
    #[error("circuit breaker is open for operation: {operation}")]
    CircuitOpen {
        /// Name the breaker is registered under.
        operation: String,
    },

    /// A retried operation never succeeded.
    #[error("operation {operation} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Name the operation was retried under.
        operation: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Message of the last failure.
        message: String,
    },

    /// An execution status change would have moved backwards.
    #[error("invalid execution status transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// Configuration values are out of range.
    #[error("configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl ResilienceError {
    /// Whether the error is one of the two refusals that never create a plan.
    pub fn is_policy_refusal(&self) -> bool {
        matches!(
            self,
            Self::AutoRecoveryDisabled | Self::ManualInterventionRequired { .. }
        )
    }

    /// Whether trying the same recovery again later could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllActionsFailed | Self::Timeout { .. } | Self::CircuitOpen { .. }
        )
    }

    // Constructors
    //
    // These methods log the error at the appropriate level.
    // Use them instead of constructing variants directly.

    pub fn categorization_failed(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "categorization_failed",
            message = %message,
            "Error categorizer returned no classification"
        );
        Self::CategorizationFailed { message }
    }

    pub fn auto_recovery_disabled() -> Self {
        log_info!(
            error_type = "auto_recovery_disabled",
            "Auto recovery requested while disabled"
        );
        Self::AutoRecoveryDisabled
    }

    pub fn manual_intervention_required(
        error_id: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        let error_id = error_id.into();
        log_warn!(
            error_type = "manual_intervention_required",
            error_id = %error_id,
            severity = %severity,
            "Error severity requires manual intervention"
        );
        Self::ManualInterventionRequired { error_id, severity }
    }

    pub fn unknown_strategy(strategy: impl Into<String>) -> Self {
        let strategy = strategy.into();
        log_error!(
            error_type = "unknown_strategy",
            strategy = %strategy,
            "Unknown recovery strategy"
        );
        Self::UnknownStrategy { strategy }
    }

    pub fn invalid_plan(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "invalid_plan",
            message = %message,
            "Recovery plan validation failed"
        );
        Self::InvalidPlan { message }
    }

    pub fn critical_action_failed(
        action_id: impl Into<String>,
        strategy: RecoveryStrategy,
        message: impl Into<String>,
    ) -> Self {
        let action_id = action_id.into();
        let message = message.into();
        log_error!(
            error_type = "critical_action_failed",
            action_id = %action_id,
            strategy = %strategy,
            message = %message,
            "Critical recovery action failed, aborting plan"
        );
        Self::CriticalActionFailed {
            action_id,
            strategy,
            message,
        }
    }

    pub fn all_actions_failed() -> Self {
        log_error!(
            error_type = "all_actions_failed",
            "All recovery actions failed"
        );
        Self::AllActionsFailed
    }

    pub fn cancelled() -> Self {
        log_warn!(error_type = "cancelled", "Recovery cancelled by caller");
        Self::Cancelled
    }

    pub fn timeout(timeout: std::time::Duration) -> Self {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        log_warn!(
            error_type = "timeout",
            timeout_ms = timeout_ms,
            "Recovery operation timed out"
        );
        Self::Timeout { timeout_ms }
    }

    pub fn circuit_open(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        log_warn!(
            error_type = "circuit_open",
            operation = %operation,
            "Circuit breaker rejected operation"
        );
        Self::CircuitOpen { operation }
    }

    pub fn retries_exhausted(
        operation: impl Into<String>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        let operation = operation.into();
        let message = message.into();
        log_error!(
            error_type = "retries_exhausted",
            operation = %operation,
            attempts = attempts,
            message = %message,
            "Operation failed after all retry attempts"
        );
        Self::RetriesExhausted {
            operation,
            attempts,
            message,
        }
    }

    pub fn invalid_transition(from: ExecutionStatus, to: ExecutionStatus) -> Self {
        log_warn!(
            error_type = "invalid_transition",
            from = ?from,
            to = ?to,
            "Refused backward execution status transition"
        );
        Self::InvalidTransition { from, to }
    }

    pub fn configuration_error(message: impl Into<String>) -> Self {
        let message = message.into();
        log_error!(
            error_type = "configuration_error",
            message = %message,
            "Recovery configuration validation failed"
        );
        Self::ConfigurationError { message }
    }
}
