//! Core types for error recovery
//!
//! ## Organization
//! - `errors` - Error classification consumed from the categorizer
//! - `recovery` - Plans, actions, results, executions and statistics

pub mod errors;
pub mod recovery;

// Re-export commonly used types
pub use errors::{
    CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorPriority, ErrorSeverity,
};
pub use recovery::{
    CategoryStats, ExecutionStatus, RecoveryAction, RecoveryData, RecoveryExecution,
    RecoveryPlan, RecoveryResult, RecoveryStats, RecoveryStrategy, StrategyStats,
};
