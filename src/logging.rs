//! Logging utilities for resilience-engine
//!
//! Re-exports tracing macros with log_* naming convention for consistency, plus the
//! span every plan execution runs inside so action-level events carry the plan id.

use crate::core_types::ErrorCategory;

// Re-export tracing macros with log_* naming
#[allow(unused_imports)]
pub use tracing::{
    debug as log_debug,
    error as log_error,
    info as log_info,
    trace as log_trace,
    warn as log_warn,
};

pub use tracing::Instrument;

/// Span covering one plan execution
pub fn plan_span(plan_id: &str, category: ErrorCategory) -> tracing::Span {
    tracing::info_span!("recovery_plan", plan_id = %plan_id, category = %category)
}
