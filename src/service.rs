//! Recovery service façade
//!
//! [`RecoveryService`] wires the categorizer, planner and executor together, gates
//! automatic recovery on configuration and severity, and owns statistics and history.
//!
//! ## Concurrency
//!
//! The service is `Send + Sync` and is meant to be shared behind an `Arc`. Plan execution
//! runs on the caller's task; the service never spawns work of its own. At most
//! `max_concurrent_recoveries` plans execute at once, later callers wait for a slot.
//!
//! Two independent locks are used: one for the executions map and history, one for the
//! statistics. Stats updates never wait on history bookkeeping, but a caller reading both
//! [`recovery_stats`](RecoveryService::recovery_stats) and
//! [`recovery_history`](RecoveryService::recovery_history) may observe one execution
//! recorded in one and not yet in the other.

use crate::config::RecoveryConfig;
use crate::core_types::{
    ErrorCategorizer, ErrorCategory, ErrorContext, ExecutionStatus, RecoveryExecution,
    RecoveryPlan, RecoveryStats, RecoveryStrategy,
};
use crate::error::{ResilienceError, ResilienceResult};
use crate::executor::{RecoveryExecutor, RecoveryOperation, SimulatedOperation, StrategyHandler};
use crate::logging::{log_debug, log_info};
use crate::planner::RecoveryPlanner;
use crate::retry::{BreakerRegistry, RetryConfig, RetryMechanism};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct ExecutionLedger {
    /// Latest execution per plan id
    executions: HashMap<String, RecoveryExecution>,
    /// Finished executions, oldest first
    history: VecDeque<RecoveryExecution>,
}

/// Error recovery service
pub struct RecoveryService {
    config: RecoveryConfig,
    categorizer: Arc<dyn ErrorCategorizer>,
    planner: RecoveryPlanner,
    executor: RecoveryExecutor,
    breakers: Arc<BreakerRegistry>,
    admission: Semaphore,
    ledger: RwLock<ExecutionLedger>,
    stats: RwLock<RecoveryStats>,
}

impl std::fmt::Debug for RecoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryService")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("active_recoveries", &self.active_recoveries())
            .finish_non_exhaustive()
    }
}

impl RecoveryService {
    /// Create a service from a validated configuration
    ///
    /// Actions run against a [`SimulatedOperation`] until a real operation is supplied
    /// with [`with_operation`](Self::with_operation).
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::ConfigurationError`] if the configuration is invalid.
    pub fn new(
        config: RecoveryConfig,
        categorizer: Arc<dyn ErrorCategorizer>,
    ) -> ResilienceResult<Self> {
        config.validate()?;
        Ok(Self::build(config, categorizer))
    }

    /// Create a service with the default configuration
    pub fn with_default_config(categorizer: Arc<dyn ErrorCategorizer>) -> Self {
        Self::build(RecoveryConfig::default(), categorizer)
    }

    fn build(config: RecoveryConfig, categorizer: Arc<dyn ErrorCategorizer>) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(
            config.circuit_breaker_threshold,
            config.circuit_breaker_timeout,
        ));
        let operation: Arc<dyn RecoveryOperation> = Arc::new(SimulatedOperation::default());
        let executor = RecoveryExecutor::with_operation(operation, Arc::clone(&breakers));
        let planner = RecoveryPlanner::new(Arc::clone(&categorizer), config.clone());

        log_debug!(
            max_concurrent_recoveries = config.max_concurrent_recoveries,
            enable_auto_recovery = config.enable_auto_recovery,
            manual_intervention_threshold = %config.manual_intervention_threshold,
            recovery_history_size = config.recovery_history_size,
            "Recovery service created"
        );

        Self {
            admission: Semaphore::new(config.max_concurrent_recoveries),
            config,
            categorizer,
            planner,
            executor,
            breakers,
            ledger: RwLock::new(ExecutionLedger::default()),
            stats: RwLock::new(RecoveryStats::default()),
        }
    }

    /// Drive every built-in strategy handler with `operation`
    pub fn with_operation(mut self, operation: Arc<dyn RecoveryOperation>) -> Self {
        self.executor = RecoveryExecutor::with_operation(operation, Arc::clone(&self.breakers));
        self
    }

    /// Register or replace the handler for one strategy
    pub fn with_handler(
        mut self,
        strategy: RecoveryStrategy,
        handler: Arc<dyn StrategyHandler>,
    ) -> Self {
        self.executor.register(strategy, handler);
        self
    }

    /// Replace the executor entirely
    pub fn with_executor(mut self, executor: RecoveryExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Circuit breakers shared by the circuit breaker strategy
    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// A retry mechanism sharing this service's circuit breakers
    pub fn retry_mechanism(&self, config: RetryConfig) -> RetryMechanism {
        RetryMechanism::with_registry(config, Arc::clone(&self.breakers))
    }

    /// Categorize `error` and build a plan for it
    ///
    /// # Errors
    ///
    /// Returns [`ResilienceError::CategorizationFailed`] when the categorizer yields nothing,
    /// and [`ResilienceError::UnknownStrategy`] when the plan needs a strategy that has no
    /// registered handler.
    pub async fn create_recovery_plan(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        context: &ErrorContext,
    ) -> ResilienceResult<RecoveryPlan> {
        let plan = self.planner.create_recovery_plan(error, context).await?;
        self.executor.validate_plan(&plan)?;
        Ok(plan)
    }

    /// Execute `plan` and record the outcome in statistics and history
    ///
    /// Always returns an execution. Plan-level failures are reported through its
    /// `status` and `error`. Cancelling `cancel` stops the plan before its next action.
    pub async fn execute_recovery_plan(
        &self,
        plan: &RecoveryPlan,
        cancel: &CancellationToken,
    ) -> RecoveryExecution {
        let _permit = tokio::select! {
            permit = self.admission.acquire() => permit.ok(),
            _ = cancel.cancelled() => None,
        };

        {
            let mut placeholder = RecoveryExecution::new(plan.id.clone());
            placeholder.status = ExecutionStatus::Running;
            self.write_ledger()
                .executions
                .insert(plan.id.clone(), placeholder);
        }

        let execution = self.executor.execute(plan, cancel).await;
        self.record(plan.category, &execution);
        execution
    }

    /// Categorize, plan and execute in one step
    ///
    /// # Errors
    ///
    /// - [`ResilienceError::AutoRecoveryDisabled`] when auto-recovery is switched off
    /// - [`ResilienceError::ManualInterventionRequired`] when the severity is at or above
    ///   the configured threshold
    /// - [`ResilienceError::CategorizationFailed`] when the categorizer yields nothing
    ///
    /// None of these create a plan or touch statistics and history. Once a plan runs, its
    /// execution is returned as-is, whatever its status.
    pub async fn auto_recover(
        &self,
        error: &(dyn std::error::Error + Send + Sync),
        context: &ErrorContext,
        cancel: &CancellationToken,
    ) -> ResilienceResult<RecoveryExecution> {
        if !self.config.enable_auto_recovery {
            return Err(ResilienceError::auto_recovery_disabled());
        }

        let message = error.to_string();
        let categorized = self
            .categorizer
            .categorize_error(error, context)
            .await
            .ok_or_else(|| ResilienceError::categorization_failed(message.clone()))?;

        if categorized.severity >= self.config.manual_intervention_threshold {
            return Err(ResilienceError::manual_intervention_required(
                categorized.id,
                categorized.severity,
            ));
        }

        let plan = self.planner.plan_for(&categorized, &message, context);
        self.executor.validate_plan(&plan)?;

        log_info!(
            plan_id = %plan.id,
            category = %plan.category,
            severity = %plan.severity,
            "Starting automatic recovery"
        );

        Ok(self.execute_recovery_plan(&plan, cancel).await)
    }

    /// Snapshot of the aggregate statistics
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The most recent `limit` executions, oldest first. `0` returns the whole history.
    pub fn recovery_history(&self, limit: usize) -> Vec<RecoveryExecution> {
        let ledger = self.read_ledger();
        let len = ledger.history.len();
        let take = if limit == 0 || limit > len { len } else { limit };
        ledger.history.iter().skip(len - take).cloned().collect()
    }

    /// Latest execution of the plan with `plan_id`, including one still running
    pub fn execution(&self, plan_id: &str) -> Option<RecoveryExecution> {
        self.read_ledger().executions.get(plan_id).cloned()
    }

    /// Number of plans currently holding an execution slot
    pub fn active_recoveries(&self) -> usize {
        self.config
            .max_concurrent_recoveries
            .saturating_sub(self.admission.available_permits())
    }

    fn record(&self, category: ErrorCategory, execution: &RecoveryExecution) {
        {
            let mut ledger = self.write_ledger();
            ledger
                .executions
                .insert(execution.plan_id.clone(), execution.clone());
            ledger.history.push_back(execution.clone());

            while ledger.history.len() > self.config.recovery_history_size {
                let Some(evicted) = ledger.history.pop_front() else {
                    break;
                };
                let superseded = ledger
                    .executions
                    .get(&evicted.plan_id)
                    .is_some_and(|current| current.start_time != evicted.start_time);
                if !superseded {
                    ledger.executions.remove(&evicted.plan_id);
                }
            }
        }

        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(category, execution);
    }

    fn read_ledger(&self) -> RwLockReadGuard<'_, ExecutionLedger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_ledger(&self) -> RwLockWriteGuard<'_, ExecutionLedger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }
}
