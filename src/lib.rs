//! # resilience-engine
//!
//! Error recovery planning and execution, plus a standalone retry-with-circuit-breaker
//! primitive.
//!
//! ## Key Features
//!
//! - **Recovery Plans**: Ordered remediation actions derived from an error's category and severity
//! - **Plan Execution**: Terminal/critical short-circuiting and cooperative cancellation
//! - **Auto Recovery**: Severity-gated categorize → plan → execute in one call
//! - **Statistics**: Running success/failure counters and a bounded execution history
//! - **Resilience**: Exponential backoff with jitter and per-operation circuit breakers
//!
//! ## Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use resilience_engine::{
//!     CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorPriority,
//!     ErrorSeverity, RecoveryService,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct NetworkCategorizer;
//!
//! #[async_trait]
//! impl ErrorCategorizer for NetworkCategorizer {
//!     async fn categorize_error(
//!         &self,
//!         _error: &(dyn std::error::Error + Send + Sync),
//!         _context: &ErrorContext,
//!     ) -> Option<CategorizedError> {
//!         Some(CategorizedError::new(
//!             ErrorCategory::Network,
//!             ErrorSeverity::Medium,
//!             ErrorPriority::High,
//!         ))
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let service = RecoveryService::with_default_config(Arc::new(NetworkCategorizer));
//! let error = std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timeout");
//! let execution = service
//!     .auto_recover(&error, &ErrorContext::new(), &CancellationToken::new())
//!     .await?;
//! println!("recovery finished with status {:?}", execution.status);
//! # Ok(())
//! # }
//! ```

// Allow missing errors documentation - errors are self-documenting via type signatures
#![allow(clippy::missing_errors_doc)]

// Core types for plans, executions and error classification
pub mod core_types;

// Logging utilities (re-exports tracing with log_* naming) - internal only
pub(crate) mod logging;

pub mod config;
pub mod error;
pub mod executor;
pub mod internals;
pub mod planner;
pub mod service;

// The retry mechanism is usable on its own
pub use internals::retry;

#[cfg(test)]
pub mod tests;

// Re-export main types
pub use config::{EngineConfig, RecoveryConfig};
pub use error::{ResilienceError, ResilienceResult};
pub use executor::{
    FnOperation, HandlerTable, RecoveryExecutor, RecoveryOperation, SimulatedOperation,
    StrategyHandler,
};
pub use planner::RecoveryPlanner;
pub use retry::{
    BreakerRegistry, CircuitBreaker, CircuitState, RetryConfig, RetryMechanism, RetryResult,
    RetryStats,
};
pub use service::RecoveryService;

pub use core_types::{
    CategorizedError, CategoryStats, ErrorCategorizer, ErrorCategory, ErrorContext,
    ErrorPriority, ErrorSeverity, ExecutionStatus, RecoveryAction, RecoveryData,
    RecoveryExecution, RecoveryPlan, RecoveryResult, RecoveryStats, RecoveryStrategy,
    StrategyStats,
};
