//! Recovery planning
//!
//! Turns a categorized error into a [`RecoveryPlan`]: an ordered list of actions chosen
//! from a fixed category table, plus time and success estimates.
//!
//! | Category | Actions |
//! |----------|---------|
//! | Network | Retry, Fallback |
//! | Database | Retry, CircuitBreaker |
//! | Validation | DataRecovery |
//! | Security | ManualIntervention |
//! | Performance | Timeout (2x default timeout), GracefulDegradation |
//! | anything else | Retry |
//!
//! Independently of the category, a high-priority ResourceCleanup action is appended
//! when the error message mentions a leaked resource (memory, connections, files,
//! sockets, goroutines).

use crate::config::RecoveryConfig;
use crate::core_types::{
    CategorizedError, ErrorCategorizer, ErrorCategory, ErrorContext, ErrorSeverity,
    RecoveryAction, RecoveryData, RecoveryPlan, RecoveryStrategy,
};
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::{log_debug, log_info};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

/// Initial delay between attempts of planned retry actions
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Discount applied to plans that need more than one action
const MULTI_ACTION_FACTOR: f64 = 0.9;

static RESOURCE_KEYWORDS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)memory|connection|file|socket|goroutine").ok());

/// Builds recovery plans from errors
pub struct RecoveryPlanner {
    categorizer: Arc<dyn ErrorCategorizer>,
    config: RecoveryConfig,
}

impl std::fmt::Debug for RecoveryPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryPlanner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RecoveryPlanner {
    pub fn new(categorizer: Arc<dyn ErrorCategorizer>, config: RecoveryConfig) -> Self {
        Self {
            categorizer,
            config,
        }
    }

    /// Categorize `error` and build a plan for it
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CategorizationFailed`] when the categorizer yields nothing.
    pub async fn create_recovery_plan(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        context: &ErrorContext,
    ) -> ResilienceResult<RecoveryPlan> {
        let message = error.to_string();
        let categorized = self
            .categorizer
            .categorize_error(error, context)
            .await
            .ok_or_else(|| ResilienceError::categorization_failed(message.clone()))?;

        Ok(self.plan_for(&categorized, &message, context))
    }

    /// Build a plan for an error that has already been categorized
    pub fn plan_for(
        &self,
        categorized: &CategorizedError,
        message: &str,
        context: &ErrorContext,
    ) -> RecoveryPlan {
        let actions = self.build_actions(categorized.category, message, context);
        let estimated_time = calculate_estimated_time(&actions);
        let success_probability = calculate_success_probability(
            categorized.category,
            categorized.severity,
            actions.len(),
        );

        let mut metadata = RecoveryData::new();
        metadata.insert(
            "priority_label".to_string(),
            categorized.priority.as_str().into(),
        );
        if !context.is_empty() {
            metadata.insert(
                "context".to_string(),
                serde_json::Value::Object(context.clone().into_iter().collect()),
            );
        }

        let now = Utc::now();
        let plan = RecoveryPlan {
            id: uuid::Uuid::new_v4().to_string(),
            error_id: categorized.id.clone(),
            error_message: message.to_string(),
            category: categorized.category,
            severity: categorized.severity,
            priority: categorized.priority.as_int(),
            actions,
            estimated_time,
            success_probability,
            created_at: now,
            updated_at: now,
            metadata,
        };

        log_info!(
            plan_id = %plan.id,
            error_id = %plan.error_id,
            category = %plan.category,
            severity = %plan.severity,
            action_count = plan.actions.len(),
            estimated_time_ms = plan.estimated_time.as_millis(),
            success_probability = plan.success_probability,
            "Recovery plan created"
        );

        plan
    }

    fn build_actions(
        &self,
        category: ErrorCategory,
        message: &str,
        context: &ErrorContext,
    ) -> Vec<RecoveryAction> {
        let operation = operation_name(context, category);
        let timeout = self.config.default_timeout;

        let mut actions = match category {
            ErrorCategory::Network => vec![
                self.retry_action(&operation, "Retry the failed network operation", 1),
                RecoveryAction::new(
                    RecoveryStrategy::Fallback,
                    "Switch to a fallback endpoint",
                    timeout,
                )
                .with_priority(2),
            ],
            ErrorCategory::Database => vec![
                self.retry_action(&operation, "Retry the failed database operation", 1),
                RecoveryAction::new(
                    RecoveryStrategy::CircuitBreaker,
                    "Guard the database behind a circuit breaker",
                    timeout,
                )
                .with_priority(2),
            ],
            ErrorCategory::Validation => vec![RecoveryAction::new(
                RecoveryStrategy::DataRecovery,
                "Repair or restore the invalid data",
                timeout,
            )],
            ErrorCategory::Security => vec![RecoveryAction::new(
                RecoveryStrategy::ManualIntervention,
                "Escalate the security incident to an operator",
                timeout,
            )],
            ErrorCategory::Performance => vec![
                RecoveryAction::new(
                    RecoveryStrategy::Timeout,
                    "Extend the operation timeout",
                    timeout.saturating_mul(2),
                ),
                RecoveryAction::new(
                    RecoveryStrategy::GracefulDegradation,
                    "Degrade non-essential functionality",
                    timeout,
                )
                .with_priority(2),
            ],
            ErrorCategory::Authentication
            | ErrorCategory::Authorization
            | ErrorCategory::Unknown => {
                vec![self.retry_action(&operation, "Retry the failed operation", 1)]
            }
        };

        if needs_resource_cleanup(message) {
            log_debug!(
                category = %category,
                "Error mentions a leaked resource, adding cleanup action"
            );
            actions.push(
                RecoveryAction::new(
                    RecoveryStrategy::ResourceCleanup,
                    "Release leaked resources",
                    timeout,
                )
                .with_priority(1),
            );
        }

        actions
            .into_iter()
            .map(|action| action.with_parameter("operation", operation.as_str()))
            .collect()
    }

    fn retry_action(&self, operation: &str, description: &str, priority: u8) -> RecoveryAction {
        RecoveryAction::new(
            RecoveryStrategy::Retry,
            description,
            self.config.default_timeout,
        )
        .with_priority(priority)
        .with_retries(self.config.max_retry_attempts, DEFAULT_RETRY_BACKOFF)
        .with_parameter("backoff_multiplier", self.config.retry_backoff_multiplier)
        .with_parameter("target", operation)
    }
}

/// Name of the failing operation, taken from the context or derived from the category
fn operation_name(context: &ErrorContext, category: ErrorCategory) -> String {
    ["operation", "source"]
        .iter()
        .find_map(|key| context.get(*key).and_then(serde_json::Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| category.as_str().to_string())
}

/// Whether the message mentions a resource that may need releasing
pub fn needs_resource_cleanup(message: &str) -> bool {
    RESOURCE_KEYWORDS
        .as_ref()
        .is_some_and(|keywords| keywords.is_match(message))
}

/// Sequential worst case: the sum of every action's timeout, saturating at `Duration::MAX`
pub fn calculate_estimated_time(actions: &[RecoveryAction]) -> Duration {
    actions
        .iter()
        .fold(Duration::ZERO, |total, action| total.saturating_add(action.timeout))
}

/// Base recovery rate observed for each category
pub fn base_success_rate(category: ErrorCategory) -> f64 {
    match category {
        ErrorCategory::Network => 0.8,
        ErrorCategory::Database => 0.7,
        ErrorCategory::Validation => 0.9,
        ErrorCategory::Security => 0.3,
        ErrorCategory::Performance => 0.6,
        ErrorCategory::Authentication => 0.5,
        ErrorCategory::Authorization => 0.4,
        ErrorCategory::Unknown => 0.5,
    }
}

pub fn severity_multiplier(severity: ErrorSeverity) -> f64 {
    match severity {
        ErrorSeverity::Low => 1.1,
        ErrorSeverity::Medium | ErrorSeverity::Info => 1.0,
        ErrorSeverity::High => 0.8,
        ErrorSeverity::Critical => 0.5,
    }
}

/// Probability that a plan recovers the error, clamped to `[0, 1]`
pub fn calculate_success_probability(
    category: ErrorCategory,
    severity: ErrorSeverity,
    action_count: usize,
) -> f64 {
    let mut probability = base_success_rate(category) * severity_multiplier(severity);
    if action_count > 1 {
        probability *= MULTI_ACTION_FACTOR;
    }
    probability.clamp(0.0, 1.0)
}
