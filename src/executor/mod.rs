//! Recovery plan execution
//!
//! [`RecoveryExecutor`] walks a plan's actions in order and dispatches each one to the
//! handler registered for its strategy. The walk stops early when:
//! - the cancellation token has fired (checked before every action) → `Cancelled`
//! - a terminal strategy succeeds → `Completed`
//! - a critical strategy fails → `Failed`
//!
//! Otherwise the plan is `Completed` if any action succeeded and `Failed` if none did.

pub mod handlers;
pub mod operation;

pub use handlers::{
    default_handlers, handler_for, CircuitBreakerHandler, HandlerTable, ManualInterventionHandler,
    RetryHandler, SingleAttemptHandler, StrategyHandler,
};
pub use operation::{FnOperation, RecoveryOperation, SimulatedOperation};

use crate::core_types::{
    ExecutionStatus, RecoveryAction, RecoveryExecution, RecoveryPlan, RecoveryResult,
    RecoveryStrategy,
};
use crate::error::{ResilienceError, ResilienceResult};
use crate::logging::{log_debug, log_info, log_warn, plan_span, Instrument};
use crate::retry::BreakerRegistry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Executes recovery plans against a strategy handler table
pub struct RecoveryExecutor {
    handlers: HandlerTable,
}

impl std::fmt::Debug for RecoveryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut strategies: Vec<_> = self.handlers.keys().map(RecoveryStrategy::as_str).collect();
        strategies.sort_unstable();
        f.debug_struct("RecoveryExecutor")
            .field("strategies", &strategies)
            .finish()
    }
}

impl RecoveryExecutor {
    pub fn new(handlers: HandlerTable) -> Self {
        Self { handlers }
    }

    /// Executor with every built-in handler driven by `operation`
    pub fn with_operation(
        operation: Arc<dyn RecoveryOperation>,
        breakers: Arc<BreakerRegistry>,
    ) -> Self {
        Self::new(default_handlers(operation, breakers))
    }

    /// Register or replace the handler for `strategy`
    pub fn register(&mut self, strategy: RecoveryStrategy, handler: Arc<dyn StrategyHandler>) {
        self.handlers.insert(strategy, handler);
    }

    /// Remove the handler for `strategy`, returning it if one was registered
    pub fn unregister(&mut self, strategy: RecoveryStrategy) -> Option<Arc<dyn StrategyHandler>> {
        self.handlers.remove(&strategy)
    }

    pub fn supports(&self, strategy: RecoveryStrategy) -> bool {
        self.handlers.contains_key(&strategy)
    }

    /// Check that a plan has actions and that every action has a handler
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::InvalidPlan`] for an empty plan and
    /// [`ResilienceError::UnknownStrategy`] for an action without a handler.
    pub fn validate_plan(&self, plan: &RecoveryPlan) -> ResilienceResult<()> {
        if plan.actions.is_empty() {
            return Err(ResilienceError::invalid_plan(format!(
                "plan {} has no actions",
                plan.id
            )));
        }
        if let Some(action) = plan.actions.iter().find(|a| !self.supports(a.strategy)) {
            return Err(ResilienceError::unknown_strategy(action.strategy.as_str()));
        }
        Ok(())
    }

    /// Run every action of `plan` in order
    ///
    /// The returned execution always has its end time and duration recorded, whatever
    /// the outcome. Plan-level failures are reported through `status` and `error`.
    pub async fn execute(
        &self,
        plan: &RecoveryPlan,
        cancel: &CancellationToken,
    ) -> RecoveryExecution {
        let started = Instant::now();
        let mut execution = RecoveryExecution::new(plan.id.clone());
        execution
            .metadata
            .insert("category".to_string(), plan.category.as_str().into());
        execution
            .metadata
            .insert("action_count".to_string(), plan.actions.len().into());
        execution.advance(ExecutionStatus::Running, None);

        log_info!(
            plan_id = %plan.id,
            category = %plan.category,
            action_count = plan.actions.len(),
            "Executing recovery plan"
        );

        let (status, error) = self
            .run_actions(plan, cancel, &mut execution)
            .instrument(plan_span(&plan.id, plan.category))
            .await;
        execution.advance(status, error);
        execution.end_time = Some(Utc::now());
        execution.duration = started.elapsed();

        log_info!(
            plan_id = %plan.id,
            status = ?execution.status,
            results = execution.results.len(),
            duration_ms = execution.duration.as_millis(),
            error = ?execution.error,
            "Recovery plan finished"
        );

        execution
    }

    async fn run_actions(
        &self,
        plan: &RecoveryPlan,
        cancel: &CancellationToken,
        execution: &mut RecoveryExecution,
    ) -> (ExecutionStatus, Option<ResilienceError>) {
        for action in &plan.actions {
            if cancel.is_cancelled() {
                return (ExecutionStatus::Cancelled, Some(ResilienceError::cancelled()));
            }

            let result = self.dispatch(action, cancel).await;
            let success = result.success;
            let message = result.error.clone().unwrap_or_default();
            execution.results.push(result);

            if success && action.strategy.is_terminal() {
                log_debug!(
                    plan_id = %plan.id,
                    action_id = %action.id,
                    strategy = %action.strategy,
                    "Terminal recovery action succeeded, skipping remaining actions"
                );
                return (ExecutionStatus::Completed, None);
            }

            if !success && action.strategy.is_critical() {
                return (
                    ExecutionStatus::Failed,
                    Some(ResilienceError::critical_action_failed(
                        action.id.clone(),
                        action.strategy,
                        message,
                    )),
                );
            }
        }

        if execution.results.iter().any(|result| result.success) {
            (ExecutionStatus::Completed, None)
        } else {
            (ExecutionStatus::Failed, Some(ResilienceError::all_actions_failed()))
        }
    }

    /// Run one action through its handler, bounded by the action's timeout
    pub async fn dispatch(
        &self,
        action: &RecoveryAction,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        let Some(handler) = self.handlers.get(&action.strategy) else {
            return RecoveryResult::failed(
                action,
                0,
                Duration::ZERO,
                ResilienceError::unknown_strategy(action.strategy.as_str()),
            );
        };

        let start = Instant::now();
        match tokio::time::timeout(action.timeout, handler.handle(action, cancel)).await {
            Ok(result) => result,
            Err(_elapsed) => {
                log_warn!(
                    action_id = %action.id,
                    strategy = %action.strategy,
                    timeout_ms = action.timeout.as_millis(),
                    "Recovery action timed out"
                );
                RecoveryResult::failed(
                    action,
                    1,
                    start.elapsed(),
                    ResilienceError::timeout(action.timeout),
                )
                .with_metadata("timed_out", true)
            }
        }
    }
}
